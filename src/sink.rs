//! The shared builder interface between the format decoders and the
//! resolution engine.
//!
//! Every decoder, regardless of wire syntax, produces the same three
//! intermediate structures: parsed nodes, per-way deferred node-id
//! lists, and per-relation deferred member lists. The separation exists
//! because ways and relations may reference entities appearing later in
//! the stream (or not at all), and relations may reference other
//! relations — a single forward pass cannot resolve these.
//!
//! [`Fragments`] is the one implementation of [`FragmentSink`]; decoders
//! depend only on the trait and never on each other.

use log::info;

use crate::primitive::{
    DataSource, DownloadPolicy, Node, PrimitiveId, PrimitiveKind, Relation, Tags, UploadPolicy,
    Way,
};

/// A deferred relation member: role, referenced external id and the
/// kind tag the payload carried for it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMember {
    pub role: String,
    pub id: i64,
    pub kind: PrimitiveKind,
}

impl RawMember {
    pub fn new(role: impl Into<String>, id: i64, kind: PrimitiveKind) -> RawMember {
        RawMember {
            role: role.into(),
            id,
            kind,
        }
    }
}

/// What a decoder calls while walking its wire format. Entities are
/// keyed by *external* id: the id as it appears in the payload, which
/// may be negative for client-local references.
pub trait FragmentSink {
    /// A fully-parsed node.
    fn push_node(&mut self, node: Node);

    /// A parsed way together with its ordered node external-id list.
    fn push_way(&mut self, way: Way, node_ids: Vec<i64>);

    /// A parsed relation together with its ordered member list.
    fn push_relation(&mut self, relation: Relation, members: Vec<RawMember>);

    /// The payload's advertised API version string.
    fn set_version(&mut self, version: String);

    /// A bounding box advertised by the payload envelope.
    fn push_source(&mut self, source: DataSource);

    fn set_upload_policy(&mut self, policy: UploadPolicy);

    fn set_download_policy(&mut self, policy: DownloadPolicy);

    fn lock(&mut self);

    /// A tag of an upload changeset embedded in the payload.
    fn push_changeset_tag(&mut self, key: String, value: String);

    /// Allocates a fresh local (negative) id, for formats that
    /// synthesize entities rather than carrying ids on the wire.
    fn next_local_id(&mut self, kind: PrimitiveKind) -> i64;
}

/// The fragment tables consumed by the resolution engine.
///
/// Tables are insertion-ordered so resolution, and therefore the
/// committed store, is reproducible for a fixed input.
#[derive(Debug, Default)]
pub struct Fragments {
    pub(crate) nodes: indexmap::IndexMap<i64, Node>,
    pub(crate) ways: indexmap::IndexMap<i64, (Way, Vec<i64>)>,
    pub(crate) relations: indexmap::IndexMap<i64, (Relation, Vec<RawMember>)>,

    pub(crate) version: Option<String>,
    pub(crate) sources: Vec<DataSource>,
    pub(crate) upload_policy: UploadPolicy,
    pub(crate) download_policy: DownloadPolicy,
    pub(crate) locked: bool,
    pub(crate) changeset_tags: Tags,

    next_local: i64,
}

impl Fragments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered entity fragments of all kinds.
    pub fn len(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FragmentSink for Fragments {
    fn push_node(&mut self, node: Node) {
        self.nodes.insert(node.meta.id, node);
    }

    fn push_way(&mut self, way: Way, mut node_ids: Vec<i64>) {
        if !way.meta.visible && !node_ids.is_empty() {
            info!(
                "deleted {} still carries {} node refs, dropping them",
                PrimitiveId::way(way.meta.id),
                node_ids.len()
            );
            node_ids.clear();
        }
        self.ways.insert(way.meta.id, (way, node_ids));
    }

    fn push_relation(&mut self, relation: Relation, mut members: Vec<RawMember>) {
        if !relation.meta.visible && !members.is_empty() {
            info!(
                "deleted {} still carries {} members, dropping them",
                PrimitiveId::relation(relation.meta.id),
                members.len()
            );
            members.clear();
        }
        self.relations.insert(relation.meta.id, (relation, members));
    }

    fn set_version(&mut self, version: String) {
        self.version = Some(version);
    }

    fn push_source(&mut self, source: DataSource) {
        self.sources.push(source);
    }

    fn set_upload_policy(&mut self, policy: UploadPolicy) {
        self.upload_policy = policy;
    }

    fn set_download_policy(&mut self, policy: DownloadPolicy) {
        self.download_policy = policy;
    }

    fn lock(&mut self) {
        self.locked = true;
    }

    fn push_changeset_tag(&mut self, key: String, value: String) {
        self.changeset_tags.insert(key, value);
    }

    fn next_local_id(&mut self, _kind: PrimitiveKind) -> i64 {
        self.next_local -= 1;
        self.next_local
    }
}
