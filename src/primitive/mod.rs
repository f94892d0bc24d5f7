//! The OSM entity model: node/way/relation value types, the `(kind, id)`
//! identity scheme and the arena-style [`PrimitiveStore`] that owns them.

pub mod geo;
pub mod id;
pub mod meta;
pub mod node;
pub mod relation;
pub mod store;
pub mod tags;
pub mod way;

#[doc(hidden)]
pub mod test;

#[doc(inline)]
pub use geo::{Bounds, DataSource, LatLon};
#[doc(inline)]
pub use id::{PrimitiveId, PrimitiveKind};
#[doc(inline)]
pub use meta::{DownloadPolicy, Meta, UploadPolicy, UserInfo};
#[doc(inline)]
pub use node::Node;
#[doc(inline)]
pub use relation::{Member, Relation};
#[doc(inline)]
pub use store::{Handle, PrimitiveStore};
#[doc(inline)]
pub use tags::Tags;
#[doc(inline)]
pub use way::Way;

/// One OSM entity of any kind, as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Primitive {
    /// Manufactures an incomplete placeholder carrying identity only.
    pub fn incomplete(kind: PrimitiveKind, id: i64) -> Primitive {
        match kind {
            PrimitiveKind::Node => Primitive::Node(Node::incomplete(id)),
            PrimitiveKind::Way => Primitive::Way(Way::incomplete(id)),
            PrimitiveKind::Relation => Primitive::Relation(Relation::incomplete(id)),
        }
    }

    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::Node(_) => PrimitiveKind::Node,
            Primitive::Way(_) => PrimitiveKind::Way,
            Primitive::Relation(_) => PrimitiveKind::Relation,
        }
    }

    pub fn meta(&self) -> &Meta {
        match self {
            Primitive::Node(node) => &node.meta,
            Primitive::Way(way) => &way.meta,
            Primitive::Relation(relation) => &relation.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        match self {
            Primitive::Node(node) => &mut node.meta,
            Primitive::Way(way) => &mut way.meta,
            Primitive::Relation(relation) => &mut relation.meta,
        }
    }

    /// The universal `(kind, id)` lookup key.
    pub fn id(&self) -> PrimitiveId {
        PrimitiveId::new(self.kind(), self.meta().id)
    }

    pub fn is_incomplete(&self) -> bool {
        self.meta().incomplete
    }

    pub fn is_visible(&self) -> bool {
        self.meta().visible
    }
}
