//! The `(kind, id)` identity scheme shared by every decoder and the
//! upload-side rewrite.

use std::fmt::{Display, Formatter};

/// The three OSM entity kinds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveKind {
    Node,
    Way,
    Relation,
}

/// The universal lookup key: a 64-bit id qualified by its entity kind.
///
/// Ids less than or equal to zero are *local*: assigned by a client,
/// unknown to the server and unique only within one in-memory session.
/// Positive ids are server ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveId {
    pub kind: PrimitiveKind,
    pub id: i64,
}

impl PrimitiveId {
    pub const fn new(kind: PrimitiveKind, id: i64) -> PrimitiveId {
        PrimitiveId { kind, id }
    }

    pub const fn node(id: i64) -> PrimitiveId {
        PrimitiveId::new(PrimitiveKind::Node, id)
    }

    pub const fn way(id: i64) -> PrimitiveId {
        PrimitiveId::new(PrimitiveKind::Way, id)
    }

    pub const fn relation(id: i64) -> PrimitiveId {
        PrimitiveId::new(PrimitiveKind::Relation, id)
    }

    /// Whether this id is client-assigned and not yet known to the server.
    pub const fn is_local(&self) -> bool {
        self.id <= 0
    }
}

impl Display for PrimitiveId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}
