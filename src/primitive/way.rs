//! The way entity: an ordered sequence of node handles.

use super::meta::Meta;
use super::store::Handle;

/// An ordered polyline (or closed ring) of nodes.
///
/// Node references are stored as store handles, resolved by the
/// resolution engine. Before resolution a way fragment carries its raw
/// external-id list alongside instead; see the fragment sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub meta: Meta,
    pub nodes: Vec<Handle>,
}

impl Way {
    pub fn new(meta: Meta) -> Way {
        Way {
            meta,
            nodes: Vec::new(),
        }
    }

    pub fn incomplete(id: i64) -> Way {
        Way::new(Meta::incomplete(id))
    }
}
