//! The node entity: identity plus an optional coordinate.

use super::geo::LatLon;
use super::meta::Meta;

/// A single point. The coordinate is absent only on placeholder nodes
/// manufactured to satisfy a reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub meta: Meta,
    pub coordinate: Option<LatLon>,
}

impl Node {
    pub fn new(meta: Meta, coordinate: Option<LatLon>) -> Node {
        Node { meta, coordinate }
    }

    pub fn incomplete(id: i64) -> Node {
        Node {
            meta: Meta::incomplete(id),
            coordinate: None,
        }
    }
}
