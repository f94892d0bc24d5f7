//! Applies a server upload response to the local store.
//!
//! After an upload the server answers with, per uploaded primitive, the
//! id and version it assigned. Creations move from their client-local
//! negative id to a fresh server id; modifications keep their id and
//! bump the version; deletions are acknowledged without any identity
//! change. Re-keying happens through the store index, so handles held
//! by ways and relations stay valid across the rewrite.

use indexmap::IndexMap;

use crate::primitive::{PrimitiveId, PrimitiveStore};
use crate::Error;

/// The identity the server assigned to one uploaded primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffEntry {
    pub new_id: i64,
    pub new_version: u32,
}

/// A parsed upload response: per old `(kind, id)` key, the new identity.
///
/// Entries are applied in insertion order, matching the order the
/// server listed them in its response.
#[derive(Debug, Default)]
pub struct DiffResult {
    entries: IndexMap<PrimitiveId, DiffEntry>,
}

impl DiffResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: PrimitiveId, new_id: i64, new_version: u32) {
        self.entries.insert(id, DiffEntry { new_id, new_version });
    }

    pub fn get(&self, id: PrimitiveId) -> Option<DiffEntry> {
        self.entries.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrites the store's identities in place.
    ///
    /// Entries naming a primitive the store does not hold are skipped;
    /// a rewrite that would collide with an existing key is a
    /// consistency fault and aborts the application.
    pub fn apply(&self, store: &mut PrimitiveStore) -> Result<(), Error> {
        for (&id, entry) in &self.entries {
            let Some(handle) = store.get(id.kind, id.id) else {
                continue;
            };
            if !store.primitive(handle).is_visible() {
                // An acknowledged deletion: identity stays frozen.
                continue;
            }
            store.rekey(handle, entry.new_id)?;
            store.primitive_mut(handle).meta_mut().version = entry.new_version;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::StoreError;
    use crate::primitive::{Meta, Node, Primitive, PrimitiveKind, Way};

    fn node(id: i64) -> Primitive {
        Primitive::Node(Node::new(Meta::new(id), None))
    }

    #[test]
    fn creations_move_to_their_server_identity() {
        let mut store = PrimitiveStore::new();
        let node_handle = store.insert(node(-1)).unwrap();

        let mut way = Way::new(Meta::new(-2));
        way.nodes.push(node_handle);
        let way_handle = store.insert(Primitive::Way(way)).unwrap();

        let mut diff = DiffResult::new();
        diff.insert(PrimitiveId::node(-1), 1001, 1);
        diff.insert(PrimitiveId::way(-2), 2002, 1);
        diff.apply(&mut store).unwrap();

        assert_eq!(store.primitive(node_handle).meta().id, 1001);
        assert_eq!(store.primitive(node_handle).meta().version, 1);
        assert!(store.get(PrimitiveKind::Node, -1).is_none());
        assert_eq!(store.get(PrimitiveKind::Node, 1001), Some(node_handle));

        // The way still points at the same slot through its handle.
        let way = match store.primitive(way_handle) {
            Primitive::Way(way) => way,
            other => panic!("expected a way, got {other:?}"),
        };
        assert_eq!(way.nodes, vec![node_handle]);
        assert_eq!(way.meta.id, 2002);
    }

    #[test]
    fn modifications_bump_only_the_version() {
        let mut store = PrimitiveStore::new();
        let mut meta = Meta::new(77);
        meta.version = 3;
        let handle = store.insert(Primitive::Node(Node::new(meta, None))).unwrap();

        let mut diff = DiffResult::new();
        diff.insert(PrimitiveId::node(77), 77, 4);
        diff.apply(&mut store).unwrap();

        let meta = store.primitive(handle).meta();
        assert_eq!(meta.id, 77);
        assert_eq!(meta.version, 4);
    }

    #[test]
    fn deletions_keep_their_identity() {
        let mut store = PrimitiveStore::new();
        let mut meta = Meta::new(5);
        meta.version = 2;
        meta.visible = false;
        let handle = store.insert(Primitive::Node(Node::new(meta, None))).unwrap();

        let mut diff = DiffResult::new();
        diff.insert(PrimitiveId::node(5), 0, 0);
        diff.apply(&mut store).unwrap();

        let meta = store.primitive(handle).meta();
        assert_eq!(meta.id, 5);
        assert_eq!(meta.version, 2);
        assert!(!meta.visible);
    }

    #[test]
    fn absent_entries_are_skipped() {
        let mut store = PrimitiveStore::new();
        store.insert(node(1)).unwrap();

        let mut diff = DiffResult::new();
        diff.insert(PrimitiveId::node(999), 1000, 1);
        diff.apply(&mut store).unwrap();

        assert!(store.get(PrimitiveKind::Node, 1).is_some());
        assert!(store.get(PrimitiveKind::Node, 1000).is_none());
    }

    #[test]
    fn colliding_rewrites_are_faults() {
        let mut store = PrimitiveStore::new();
        store.insert(node(-1)).unwrap();
        store.insert(node(42)).unwrap();

        let mut diff = DiffResult::new();
        diff.insert(PrimitiveId::node(-1), 42, 1);

        match diff.apply(&mut store) {
            Err(Error::Store(StoreError::RewriteCollision { from, to })) => {
                assert_eq!(from, PrimitiveId::node(-1));
                assert_eq!(to, PrimitiveId::node(42));
            }
            other => panic!("expected a rewrite collision, got {other:?}"),
        }
    }
}
