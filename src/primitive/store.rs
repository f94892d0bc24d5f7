//! The mutable graph container owning all entities of one session.
//!
//! The store is an arena: entities live in slots addressed by a stable
//! [`Handle`], and a `(kind, id)` index enforces one entity per key.
//! Way node lists and relation member lists hold handles rather than
//! ids, so upgrading a placeholder in place (or rewriting ids after an
//! upload) never invalidates a reference held elsewhere in the graph.
//!
//! The store is not internally thread-safe; concurrent parses must use
//! separate stores and serialize any merge themselves.

use rustc_hash::FxHashMap;

use crate::error::StoreError;

use super::geo::DataSource;
use super::id::{PrimitiveId, PrimitiveKind};
use super::meta::{DownloadPolicy, UploadPolicy};
use super::node::Node;
use super::relation::Relation;
use super::tags::Tags;
use super::way::Way;
use super::Primitive;

/// A stable index of one arena slot. Handles never dangle: slots are
/// only ever overwritten in place, never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(usize);

/// The primitive arena plus the dataset-level metadata decoders read
/// off the payload envelope.
#[derive(Debug, Default)]
pub struct PrimitiveStore {
    slots: Vec<Primitive>,
    index: FxHashMap<PrimitiveId, Handle>,

    version: Option<String>,
    sources: Vec<DataSource>,
    upload_policy: UploadPolicy,
    download_policy: DownloadPolicy,
    locked: bool,
    changeset_tags: Tags,
}

impl PrimitiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the handle registered for `(kind, id)`, in any
    /// completeness state.
    pub fn get(&self, kind: PrimitiveKind, id: i64) -> Option<Handle> {
        self.index.get(&PrimitiveId::new(kind, id)).copied()
    }

    pub fn contains(&self, id: PrimitiveId) -> bool {
        self.index.contains_key(&id)
    }

    /// Returns the existing entity under `(kind, id)` if present, else
    /// creates and stores an incomplete placeholder. Repeated calls for
    /// the same key always yield the same handle.
    pub fn create_or_get_incomplete(&mut self, kind: PrimitiveKind, id: i64) -> Handle {
        if let Some(handle) = self.get(kind, id) {
            return handle;
        }
        self.push(Primitive::incomplete(kind, id))
    }

    /// Adds an entity to the store.
    ///
    /// If an incomplete placeholder with the same key already exists its
    /// slot is overwritten in place, so every handle previously handed
    /// out keeps pointing at the now-complete entity. Overwriting a
    /// complete entity is a consistency fault.
    pub fn insert(&mut self, primitive: Primitive) -> Result<Handle, StoreError> {
        match self.index.get(&primitive.id()).copied() {
            Some(handle) => {
                let slot = &mut self.slots[handle.0];
                if !slot.is_incomplete() {
                    return Err(StoreError::Occupied(primitive.id()));
                }
                *slot = primitive;
                Ok(handle)
            }
            None => Ok(self.push(primitive)),
        }
    }

    fn push(&mut self, primitive: Primitive) -> Handle {
        let handle = Handle(self.slots.len());
        self.index.insert(primitive.id(), handle);
        self.slots.push(primitive);
        handle
    }

    /// Re-keys the entity behind `handle` to a new id, preserving the
    /// handle. Used by the upload-side identity rewrite.
    pub fn rekey(&mut self, handle: Handle, new_id: i64) -> Result<(), StoreError> {
        let old = self.slots[handle.0].id();
        let new = PrimitiveId::new(old.kind, new_id);
        if old == new {
            return Ok(());
        }
        if self.index.contains_key(&new) {
            return Err(StoreError::RewriteCollision { from: old, to: new });
        }
        self.index.remove(&old);
        self.index.insert(new, handle);
        self.slots[handle.0].meta_mut().id = new_id;
        Ok(())
    }

    pub fn primitive(&self, handle: Handle) -> &Primitive {
        &self.slots[handle.0]
    }

    pub fn primitive_mut(&mut self, handle: Handle) -> &mut Primitive {
        &mut self.slots[handle.0]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All entities in insertion order, paired with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Primitive)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, primitive)| (Handle(index), primitive))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.slots.iter().filter_map(|primitive| match primitive {
            Primitive::Node(node) => Some(node),
            _ => None,
        })
    }

    pub fn ways(&self) -> impl Iterator<Item = &Way> {
        self.slots.iter().filter_map(|primitive| match primitive {
            Primitive::Way(way) => Some(way),
            _ => None,
        })
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.slots.iter().filter_map(|primitive| match primitive {
            Primitive::Relation(relation) => Some(relation),
            _ => None,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn way_count(&self) -> usize {
        self.ways().count()
    }

    pub fn relation_count(&self) -> usize {
        self.relations().count()
    }

    /// The API version string the payload advertised, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }

    pub fn sources(&self) -> &[DataSource] {
        &self.sources
    }

    pub fn add_source(&mut self, source: DataSource) {
        self.sources.push(source);
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        self.upload_policy
    }

    pub fn set_upload_policy(&mut self, policy: UploadPolicy) {
        self.upload_policy = policy;
    }

    pub fn download_policy(&self) -> DownloadPolicy {
        self.download_policy
    }

    pub fn set_download_policy(&mut self, policy: DownloadPolicy) {
        self.download_policy = policy;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Tags of an upload changeset embedded in the payload, if any.
    pub fn changeset_tags(&self) -> &Tags {
        &self.changeset_tags
    }

    pub fn add_changeset_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.changeset_tags.insert(key, value);
    }
}
