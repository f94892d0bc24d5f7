#![cfg(test)]

use std::str::FromStr;

use crate::error::StoreError;
use crate::primitive::{
    DownloadPolicy, LatLon, Meta, Node, Primitive, PrimitiveId, PrimitiveKind, PrimitiveStore,
    UploadPolicy, UserInfo,
};

fn complete_node(id: i64, lat: f64, lon: f64) -> Primitive {
    Primitive::Node(Node::new(Meta::new(id), Some(LatLon::new(lat, lon))))
}

#[test]
fn insert_then_lookup() {
    let mut store = PrimitiveStore::new();
    let handle = store.insert(complete_node(42, 1.0, 2.0)).unwrap();

    assert_eq!(store.get(PrimitiveKind::Node, 42), Some(handle));
    assert_eq!(store.get(PrimitiveKind::Way, 42), None);
    assert_eq!(store.node_count(), 1);
}

#[test]
fn placeholder_upgrade_preserves_handle() {
    let mut store = PrimitiveStore::new();
    let placeholder = store.create_or_get_incomplete(PrimitiveKind::Node, 7);
    assert!(store.primitive(placeholder).is_incomplete());

    let upgraded = store.insert(complete_node(7, 48.1, 11.5)).unwrap();
    assert_eq!(placeholder, upgraded);
    assert!(!store.primitive(placeholder).is_incomplete());
    assert_eq!(store.len(), 1);
}

#[test]
fn placeholder_reused_for_repeated_requests() {
    let mut store = PrimitiveStore::new();
    let first = store.create_or_get_incomplete(PrimitiveKind::Relation, 9);
    let second = store.create_or_get_incomplete(PrimitiveKind::Relation, 9);

    assert_eq!(first, second);
    assert_eq!(store.len(), 1);
}

#[test]
fn overwriting_complete_entity_is_a_fault() {
    let mut store = PrimitiveStore::new();
    store.insert(complete_node(5, 0.0, 0.0)).unwrap();

    match store.insert(complete_node(5, 1.0, 1.0)) {
        Err(StoreError::Occupied(id)) => assert_eq!(id, PrimitiveId::node(5)),
        other => panic!("expected occupied fault, got {other:?}"),
    }
}

#[test]
fn rekey_moves_the_index_entry() {
    let mut store = PrimitiveStore::new();
    let handle = store.insert(complete_node(-3, 0.0, 0.0)).unwrap();

    store.rekey(handle, 4001).unwrap();
    assert_eq!(store.get(PrimitiveKind::Node, -3), None);
    assert_eq!(store.get(PrimitiveKind::Node, 4001), Some(handle));
    assert_eq!(store.primitive(handle).meta().id, 4001);
}

#[test]
fn rekey_collision_is_a_fault() {
    let mut store = PrimitiveStore::new();
    let handle = store.insert(complete_node(-3, 0.0, 0.0)).unwrap();
    store.insert(complete_node(4001, 1.0, 1.0)).unwrap();

    assert!(matches!(
        store.rekey(handle, 4001),
        Err(StoreError::RewriteCollision { .. })
    ));
}

#[test]
fn policies_parse_their_wire_spelling() {
    assert_eq!(UploadPolicy::from_str("true").unwrap(), UploadPolicy::Normal);
    assert_eq!(
        UploadPolicy::from_str("false").unwrap(),
        UploadPolicy::Discouraged
    );
    assert_eq!(
        UploadPolicy::from_str("never").unwrap(),
        UploadPolicy::Blocked
    );
    assert!(UploadPolicy::from_str("maybe").is_err());

    assert_eq!(
        DownloadPolicy::from_str("never").unwrap(),
        DownloadPolicy::Blocked
    );
}

#[test]
fn attribution_from_attribute_pair() {
    assert_eq!(UserInfo::from_attributes(None, None), UserInfo::Anonymous);
    assert_eq!(
        UserInfo::from_attributes(None, Some("fred".into())),
        UserInfo::Local("fred".into())
    );
    assert_eq!(
        UserInfo::from_attributes(Some(101), Some("fred".into())),
        UserInfo::Server {
            uid: 101,
            name: Some("fred".into())
        }
    );
}

#[test]
fn local_ids_are_non_positive() {
    assert!(PrimitiveId::node(-1).is_local());
    assert!(PrimitiveId::way(0).is_local());
    assert!(!PrimitiveId::relation(1).is_local());
}
