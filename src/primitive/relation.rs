//! The relation entity: an ordered sequence of role-tagged members.

use super::meta::Meta;
use super::store::Handle;

/// One relation member: a role string and the handle of the referenced
/// primitive, which may be of any kind including another relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub role: String,
    pub handle: Handle,
}

impl Member {
    pub fn new(role: impl Into<String>, handle: Handle) -> Member {
        Member {
            role: role.into(),
            handle,
        }
    }
}

/// A grouping of primitives under per-member roles.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub meta: Meta,
    pub members: Vec<Member>,
}

impl Relation {
    pub fn new(meta: Meta) -> Relation {
        Relation {
            meta,
            members: Vec::new(),
        }
    }

    pub fn incomplete(id: i64) -> Relation {
        Relation::new(Meta::incomplete(id))
    }
}
