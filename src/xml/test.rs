#![cfg(test)]

use crate::error::DecodeError;
use crate::options::{CancelToken, Options};
use crate::primitive::{
    DownloadPolicy, PrimitiveKind, PrimitiveStore, UploadPolicy, UserInfo,
};
use crate::Error;

fn parse(xml: &str) -> Result<PrimitiveStore, Error> {
    crate::xml::parse(xml.as_bytes(), &Options::default())
}

fn malformed_message(result: Result<PrimitiveStore, Error>) -> String {
    match result {
        Err(Error::Decode(DecodeError::Malformed { message, .. })) => message,
        other => panic!("expected malformed, got {other:?}"),
    }
}

const FULL_DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="test" upload="false" download="never" locked="true">
  <bounds minlat="48" minlon="11" maxlat="48.1" maxlon="11.1" origin="server"/>
  <changeset>
    <tag k="comment" v="survey import"/>
  </changeset>
  <node id="101" version="2" changeset="55" timestamp="2023-04-01T12:30:00Z" uid="7" user="alice" lat="48.05" lon="11.05">
    <tag k="amenity" v="bench"/>
  </node>
  <node id="102" version="1" lat="48.06" lon="11.06"/>
  <way id="201" version="3">
    <nd ref="101"/>
    <nd ref="102"/>
    <tag k="highway" v="path"/>
  </way>
  <relation id="301" version="1">
    <member type="way" ref="201" role="outer"/>
    <member type="node" ref="101" role=""/>
    <tag k="type" v="multipolygon"/>
  </relation>
</osm>
"#;

#[test_log::test]
fn full_document_parses() {
    let store = parse(FULL_DOCUMENT).unwrap();

    assert_eq!(store.version(), Some("0.6"));
    assert_eq!(store.upload_policy(), UploadPolicy::Discouraged);
    assert_eq!(store.download_policy(), DownloadPolicy::Blocked);
    assert!(store.is_locked());
    assert_eq!(store.sources()[0].origin.as_deref(), Some("server"));
    assert_eq!(store.changeset_tags().get("comment"), Some("survey import"));

    let node = store
        .nodes()
        .find(|node| node.meta.id == 101)
        .unwrap();
    assert_eq!(node.meta.version, 2);
    assert_eq!(node.meta.changeset, 55);
    assert_eq!(
        node.meta.user,
        UserInfo::Server {
            uid: 7,
            name: Some("alice".to_string())
        }
    );
    assert_eq!(node.meta.tags.get("amenity"), Some("bench"));
    assert_eq!(node.coordinate.unwrap().lat, 48.05);
    let timestamp = node.meta.timestamp.unwrap();
    assert_eq!(timestamp.to_rfc3339(), "2023-04-01T12:30:00+00:00");

    let way = store.ways().next().unwrap();
    assert!(!way.meta.incomplete);
    let refs: Vec<i64> = way
        .nodes
        .iter()
        .map(|&handle| store.primitive(handle).meta().id)
        .collect();
    assert_eq!(refs, vec![101, 102]);

    let relation = store.relations().next().unwrap();
    assert_eq!(relation.members.len(), 2);
    assert_eq!(relation.members[0].role, "outer");
    assert_eq!(
        store.primitive(relation.members[0].handle).id().kind,
        PrimitiveKind::Way
    );
}

#[test]
fn root_version_is_mandatory() {
    let message = malformed_message(parse(r#"<osm><node id="1" version="1"/></osm>"#));
    assert!(message.contains("version"), "{message}");

    let message = malformed_message(parse(r#"<osm version="0.5"></osm>"#));
    assert!(message.contains("0.5"), "{message}");
}

#[test]
fn missing_root_is_fatal() {
    let message = malformed_message(parse(r#"<?xml version="1.0"?>"#));
    assert!(message.contains("osm"), "{message}");
}

#[test]
fn id_zero_is_fatal_with_position() {
    let document = "<?xml version=\"1.0\"?>\n<osm version=\"0.6\">\n  <node id=\"0\" lat=\"1\" lon=\"1\"/>\n</osm>";
    match parse(document) {
        Err(Error::Decode(DecodeError::Malformed {
            message,
            position: Some(position),
        })) => {
            assert!(message.contains("id 0"), "{message}");
            assert_eq!(position.line, 3);
        }
        other => panic!("expected positioned malformed, got {other:?}"),
    }
}

#[test]
fn server_id_requires_a_version() {
    let message = malformed_message(parse(
        r#"<osm version="0.6"><node id="5" lat="1" lon="1"/></osm>"#,
    ));
    assert!(message.contains("version"), "{message}");

    // Zero versions are equally invalid for server ids.
    let message = malformed_message(parse(
        r#"<osm version="0.6"><node id="5" version="0" lat="1" lon="1"/></osm>"#,
    ));
    assert!(message.contains("version 0"), "{message}");
}

#[test_log::test]
fn local_ids_tolerate_missing_or_negative_versions() {
    let store = parse(
        r#"<osm version="0.6">
             <node id="-1" lat="1" lon="1"/>
             <node id="-2" version="-5" lat="2" lon="2"/>
             <node id="-3" changeset="junk" lat="3" lon="3"/>
           </osm>"#,
    )
    .unwrap();

    for node in store.nodes() {
        assert_eq!(node.meta.version, 0);
        assert_eq!(node.meta.changeset, 0);
    }
}

#[test]
fn visible_must_be_a_literal_boolean() {
    let message = malformed_message(parse(
        r#"<osm version="0.6"><node id="1" version="1" visible="yes" lat="1" lon="1"/></osm>"#,
    ));
    assert!(message.contains("visible") && message.contains("yes"), "{message}");
}

#[test]
fn coordinates_are_range_checked() {
    let message = malformed_message(parse(
        r#"<osm version="0.6"><node id="1" version="1" lat="91" lon="1"/></osm>"#,
    ));
    assert!(message.contains("lat") && message.contains("91"), "{message}");

    let message = malformed_message(parse(
        r#"<osm version="0.6"><node id="1" version="1" lat="1" lon="east"/></osm>"#,
    ));
    assert!(message.contains("lon") && message.contains("east"), "{message}");

    let message = malformed_message(parse(
        r#"<osm version="0.6"><node id="1" version="1" lat="1"/></osm>"#,
    ));
    assert!(message.contains("lat/lon"), "{message}");
}

#[test]
fn nd_is_only_valid_inside_a_way() {
    let message = malformed_message(parse(
        r#"<osm version="0.6"><node id="1" version="1" lat="1" lon="1"><nd ref="2"/></node></osm>"#,
    ));
    assert!(message.contains("'nd'"), "{message}");
}

#[test]
fn member_type_must_be_known() {
    let message = malformed_message(parse(
        r#"<osm version="0.6"><relation id="1" version="1"><member type="area" ref="2" role=""/></relation></osm>"#,
    ));
    assert!(message.contains("area"), "{message}");
}

#[test]
fn references_to_id_zero_are_fatal() {
    let message = malformed_message(parse(
        r#"<osm version="0.6"><way id="1" version="1"><nd ref="0"/></way></osm>"#,
    ));
    assert!(message.contains("references id 0"), "{message}");
}

#[test_log::test]
fn unknown_subtrees_are_skipped() {
    let store = parse(
        r#"<osm version="0.6">
             <fancy-extension>
               <node id="99" version="1" lat="1" lon="1"/>
               <tag k="leaks" v="no"/>
             </fancy-extension>
             <node id="1" version="1" lat="1" lon="1"/>
           </osm>"#,
    )
    .unwrap();

    assert_eq!(store.node_count(), 1);
    assert!(store.get(PrimitiveKind::Node, 99).is_none());
    assert!(store.changeset_tags().is_empty());
}

#[test_log::test]
fn delete_action_marks_invisible_and_drops_references() {
    let store = parse(
        r#"<osm version="0.6">
             <node id="1" version="1" lat="1" lon="1"/>
             <way id="2" version="1" action="delete">
               <nd ref="1"/>
             </way>
           </osm>"#,
    )
    .unwrap();

    let way = store.ways().next().unwrap();
    assert!(!way.meta.visible);
    assert!(way.nodes.is_empty());
}

#[test]
fn tags_require_both_attributes() {
    let message = malformed_message(parse(
        r#"<osm version="0.6"><node id="1" version="1" lat="1" lon="1"><tag k="name"/></node></osm>"#,
    ));
    assert!(message.contains("'v'"), "{message}");
}

#[test]
fn cancellation_unwinds_mid_document() {
    let token = CancelToken::new();
    token.cancel();
    let options = Options::with_cancel(token);

    assert!(matches!(
        crate::xml::parse(FULL_DOCUMENT.as_bytes(), &options),
        Err(Error::Decode(DecodeError::Cancelled))
    ));
}

#[test_log::test]
fn written_documents_parse_back_identically() {
    let original = parse(FULL_DOCUMENT).unwrap();

    let mut buffer = Vec::new();
    crate::xml::write(&original, &mut buffer).unwrap();
    let reparsed = crate::xml::parse(buffer.as_slice(), &Options::default()).unwrap();

    assert_eq!(original.len(), reparsed.len());
    assert_eq!(original.upload_policy(), reparsed.upload_policy());
    assert_eq!(original.download_policy(), reparsed.download_policy());
    assert_eq!(original.is_locked(), reparsed.is_locked());
    assert_eq!(original.changeset_tags(), reparsed.changeset_tags());
    assert_eq!(original.sources(), reparsed.sources());

    for (a, b) in original.nodes().zip(reparsed.nodes()) {
        assert_eq!(a, b);
    }
    for (a, b) in original.ways().zip(reparsed.ways()) {
        assert_eq!(a.meta, b.meta);
        let refs = |store: &PrimitiveStore, way: &crate::primitive::Way| -> Vec<i64> {
            way.nodes
                .iter()
                .map(|&handle| store.primitive(handle).meta().id)
                .collect()
        };
        assert_eq!(refs(&original, a), refs(&reparsed, b));
    }
    for (a, b) in original.relations().zip(reparsed.relations()) {
        assert_eq!(a.meta, b.meta);
        for (left, right) in a.members.iter().zip(&b.members) {
            assert_eq!(left.role, right.role);
            assert_eq!(
                original.primitive(left.handle).id(),
                reparsed.primitive(right.handle).id()
            );
        }
    }
}
