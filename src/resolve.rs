//! The reference-resolution engine shared by all decoders.
//!
//! Runs once, after a decoder has exhausted its input, as three ordered
//! passes inside one logical transaction: commit nodes, resolve ways,
//! resolve relations. The store is built locally and only returned on
//! full success, so a caller observes either the fully-resolved graph
//! or nothing.
//!
//! Relations are handled in two sub-steps — register every relation
//! shell first, then resolve member lists — because relations may
//! reference each other (including cyclically) regardless of the order
//! they were declared in; a single pass would fail on mutually- or
//! self-referencing relation graphs, which are legal data.

use log::info;

use crate::error::DecodeError;
use crate::options::Options;
use crate::primitive::{
    Member, Primitive, PrimitiveId, PrimitiveKind, PrimitiveStore,
};
use crate::sink::Fragments;
use crate::Error;

/// Resolves the fragment tables into a linked primitive store.
///
/// Missing references to positive (server) ids manufacture exactly one
/// incomplete placeholder per `(kind, id)`, shared by every referrer.
/// Missing references to non-positive (local) ids abort the parse.
/// References resolving to a deleted entity are elided with a log line.
pub fn resolve(fragments: Fragments, options: &Options) -> Result<PrimitiveStore, Error> {
    options.check()?;

    let mut store = PrimitiveStore::new();

    if let Some(version) = fragments.version {
        store.set_version(version);
    }
    for source in fragments.sources {
        store.add_source(source);
    }
    store.set_upload_policy(fragments.upload_policy);
    store.set_download_policy(fragments.download_policy);
    for (key, value) in fragments.changeset_tags {
        store.add_changeset_tag(key, value);
    }

    commit_nodes(&mut store, fragments.nodes)?;
    resolve_ways(&mut store, fragments.ways)?;
    resolve_relations(&mut store, fragments.relations)?;

    // Applied last so decoders were free to populate a locked dataset.
    if fragments.locked {
        store.lock();
    }

    Ok(store)
}

fn commit_nodes(
    store: &mut PrimitiveStore,
    nodes: indexmap::IndexMap<i64, crate::primitive::Node>,
) -> Result<(), Error> {
    for (_, node) in nodes {
        store.insert(Primitive::Node(node))?;
    }
    Ok(())
}

fn resolve_ways(
    store: &mut PrimitiveStore,
    ways: indexmap::IndexMap<i64, (crate::primitive::Way, Vec<i64>)>,
) -> Result<(), Error> {
    for (external_id, (mut way, node_ids)) in ways {
        let mut resolved = Vec::with_capacity(node_ids.len());
        let mut incomplete = false;

        for id in node_ids {
            let handle = match store.get(PrimitiveKind::Node, id) {
                Some(handle) => handle,
                None if id <= 0 => {
                    return Err(DecodeError::DanglingLocalReference {
                        parent: PrimitiveId::way(external_id),
                        reference: PrimitiveId::node(id),
                    }
                    .into());
                }
                None => store.create_or_get_incomplete(PrimitiveKind::Node, id),
            };

            let node = store.primitive(handle);
            if !node.is_visible() {
                info!(
                    "deleted node {id} is part of way {external_id}, skipping the reference"
                );
                continue;
            }
            if node.is_incomplete() {
                incomplete = true;
            }
            resolved.push(handle);
        }

        if incomplete {
            info!(
                "way {external_id} is incomplete: at least one node was missing from the payload"
            );
            way.meta.incomplete = true;
        }
        way.nodes = resolved;
        store.insert(Primitive::Way(way))?;
    }
    Ok(())
}

fn resolve_relations(
    store: &mut PrimitiveStore,
    relations: indexmap::IndexMap<i64, (crate::primitive::Relation, Vec<crate::sink::RawMember>)>,
) -> Result<(), Error> {
    // Register every relation shell first, so relation-to-relation
    // references find their target no matter the declaration order.
    let mut pending = Vec::with_capacity(relations.len());
    for (external_id, (relation, members)) in relations {
        let handle = store.insert(Primitive::Relation(relation))?;
        pending.push((external_id, handle, members));
    }

    for (external_id, handle, members) in pending {
        let mut resolved = Vec::with_capacity(members.len());
        for member in members {
            let target = match store.get(member.kind, member.id) {
                Some(target) => target,
                None if member.id <= 0 => {
                    return Err(DecodeError::DanglingLocalReference {
                        parent: PrimitiveId::relation(external_id),
                        reference: PrimitiveId::new(member.kind, member.id),
                    }
                    .into());
                }
                None => store.create_or_get_incomplete(member.kind, member.id),
            };

            if !store.primitive(target).is_visible() {
                info!(
                    "deleted {} is used by relation {external_id}, skipping the member",
                    PrimitiveId::new(member.kind, member.id)
                );
                continue;
            }
            resolved.push(Member::new(member.role, target));
        }

        if let Primitive::Relation(relation) = store.primitive_mut(handle) {
            relation.members = resolved;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::primitive::{LatLon, Meta, Node, Relation, Way};
    use crate::sink::{FragmentSink, RawMember};

    fn node(id: i64) -> Node {
        Node::new(Meta::new(id), Some(LatLon::new(1.0, 2.0)))
    }

    fn way(id: i64) -> Way {
        Way::new(Meta::new(id))
    }

    fn relation(id: i64) -> Relation {
        Relation::new(Meta::new(id))
    }

    #[test_log::test]
    fn way_over_missing_server_node_gets_a_placeholder() {
        let mut fragments = Fragments::new();
        fragments.push_way(way(1), vec![55]);

        let store = resolve(fragments, &Options::default()).unwrap();

        let handle = store.get(PrimitiveKind::Node, 55).expect("placeholder");
        let Primitive::Node(placeholder) = store.primitive(handle) else {
            panic!("expected a node");
        };
        assert!(placeholder.meta.incomplete);
        assert!(placeholder.coordinate.is_none());

        let resolved = store.ways().next().unwrap();
        assert!(resolved.meta.incomplete);
        assert_eq!(resolved.nodes, vec![handle]);
    }

    #[test]
    fn way_over_missing_local_node_is_fatal() {
        let mut fragments = Fragments::new();
        fragments.push_way(way(1), vec![-7]);

        match resolve(fragments, &Options::default()) {
            Err(Error::Decode(DecodeError::DanglingLocalReference { parent, reference })) => {
                assert_eq!(parent, PrimitiveId::way(1));
                assert_eq!(reference, PrimitiveId::node(-7));
            }
            other => panic!("expected dangling local reference, got {other:?}"),
        }
    }

    #[test]
    fn shared_placeholder_between_two_ways() {
        let mut fragments = Fragments::new();
        fragments.push_way(way(1), vec![9]);
        fragments.push_way(way(2), vec![9]);

        let store = resolve(fragments, &Options::default()).unwrap();

        let handles: Vec<_> = store.ways().map(|w| w.nodes.clone()).collect();
        assert_eq!(handles[0], handles[1]);
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn relations_cross_reference_regardless_of_order() {
        for flipped in [false, true] {
            let mut fragments = Fragments::new();
            let mut first = (
                relation(1),
                vec![RawMember::new("sibling", 2, PrimitiveKind::Relation)],
            );
            let mut second = (
                relation(2),
                vec![RawMember::new("sibling", 1, PrimitiveKind::Relation)],
            );
            if flipped {
                std::mem::swap(&mut first, &mut second);
            }
            fragments.push_relation(first.0, first.1);
            fragments.push_relation(second.0, second.1);

            let store = resolve(fragments, &Options::default()).unwrap();
            assert_eq!(store.relation_count(), 2);
            for rel in store.relations() {
                assert_eq!(rel.members.len(), 1);
                assert!(!store.primitive(rel.members[0].handle).is_incomplete());
            }
        }
    }

    #[test]
    fn self_referencing_relation_resolves() {
        let mut fragments = Fragments::new();
        fragments.push_relation(
            relation(5),
            vec![RawMember::new("self", 5, PrimitiveKind::Relation)],
        );

        let store = resolve(fragments, &Options::default()).unwrap();
        let rel = store.relations().next().unwrap();
        assert_eq!(rel.members.len(), 1);
        assert_eq!(
            store.primitive(rel.members[0].handle).id(),
            PrimitiveId::relation(5)
        );
    }

    #[test_log::test]
    fn deleted_member_is_elided() {
        let mut deleted = node(3);
        deleted.meta.visible = false;

        let mut fragments = Fragments::new();
        fragments.push_node(node(1));
        fragments.push_node(deleted);
        fragments.push_relation(
            relation(10),
            vec![
                RawMember::new("keep", 1, PrimitiveKind::Node),
                RawMember::new("gone", 3, PrimitiveKind::Node),
            ],
        );

        let store = resolve(fragments, &Options::default()).unwrap();
        let rel = store.relations().next().unwrap();
        assert_eq!(rel.members.len(), 1);
        assert_eq!(rel.members[0].role, "keep");
    }

    #[test_log::test]
    fn deleted_node_is_elided_from_way() {
        let mut deleted = node(2);
        deleted.meta.visible = false;

        let mut fragments = Fragments::new();
        fragments.push_node(node(1));
        fragments.push_node(deleted);
        fragments.push_way(way(7), vec![1, 2]);

        let store = resolve(fragments, &Options::default()).unwrap();
        let resolved = store.ways().next().unwrap();
        assert_eq!(resolved.nodes.len(), 1);
        // Elision of a present-but-deleted node does not make the way incomplete.
        assert!(!resolved.meta.incomplete);
    }

    #[test]
    fn deleted_way_drops_its_refs_at_the_sink() {
        let mut gone = way(4);
        gone.meta.visible = false;

        let mut fragments = Fragments::new();
        fragments.push_way(gone, vec![55, 56]);

        let store = resolve(fragments, &Options::default()).unwrap();
        // No placeholders were manufactured for the dropped refs.
        assert_eq!(store.node_count(), 0);
        assert!(store.ways().next().unwrap().nodes.is_empty());
    }

    #[test]
    fn cancelled_before_resolution_commits_nothing() {
        let mut fragments = Fragments::new();
        fragments.push_node(node(1));

        let token = crate::options::CancelToken::new();
        token.cancel();
        let options = Options::with_cancel(token);

        assert!(matches!(
            resolve(fragments, &options),
            Err(Error::Decode(DecodeError::Cancelled))
        ));
    }

    #[test]
    fn node_upgrade_keeps_existing_placeholder_identity() {
        // A relation member manufactures a way placeholder; a later parse
        // pass of the same payload would upgrade it. Model the upgrade
        // directly against the store.
        let mut fragments = Fragments::new();
        fragments.push_relation(
            relation(1),
            vec![RawMember::new("outer", 12, PrimitiveKind::Way)],
        );
        let mut store = resolve(fragments, &Options::default()).unwrap();

        let placeholder = store.get(PrimitiveKind::Way, 12).unwrap();
        let upgraded = store.insert(Primitive::Way(way(12))).unwrap();
        assert_eq!(placeholder, upgraded);
        assert!(!store.primitive(placeholder).is_incomplete());
    }
}
