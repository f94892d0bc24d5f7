//! The OSM-JSON decoder, plus the GeoJSON decoder under [`geojson`].
//!
//! OSM-JSON is the Overpass-style rendering of the XML dialect: a
//! document object with a `version` and a flat `elements` array, each
//! element tagged by `type`. Validation mirrors the XML attribute rules;
//! faults carry the line/column serde reports for structural errors and
//! no position for semantic ones.

pub mod geojson;


use std::io::Read;
use std::str::FromStr;

use log::warn;
use serde::Deserialize;
use serde_json::Value;

use chrono::{DateTime, Utc};

use crate::error::DecodeError;
use crate::options::Options;
use crate::primitive::{
    LatLon, Meta, Node, PrimitiveId, PrimitiveKind, PrimitiveStore, Relation, Tags, UserInfo, Way,
};
use crate::resolve::resolve;
use crate::sink::{FragmentSink, Fragments, RawMember};
use crate::Error;

/// Parses an OSM-JSON byte stream into a resolved primitive store.
pub fn parse<R: Read>(read: R, options: &Options) -> Result<PrimitiveStore, Error> {
    let mut fragments = Fragments::new();
    decode(read, options, &mut fragments)?;
    resolve(fragments, options)
}

fn decode<R: Read>(
    read: R,
    options: &Options,
    sink: &mut impl FragmentSink,
) -> Result<(), DecodeError> {
    let document: Document = serde_json::from_reader(read)?;
    check_version(document.version.as_ref())?;
    sink.set_version("0.6".to_string());

    for element in document.elements {
        options.check()?;
        match element {
            Element::Node(node) => commit_node(node, sink)?,
            Element::Way(way) => commit_way(way, sink)?,
            Element::Relation(relation) => commit_relation(relation, sink)?,
        }
    }
    Ok(())
}

/// The document version may be rendered as a number or a string; both
/// must spell 0.6.
fn check_version(version: Option<&Value>) -> Result<(), DecodeError> {
    match version {
        Some(Value::String(text)) if text == "0.6" => Ok(()),
        Some(Value::Number(number)) if number.as_f64() == Some(0.6) => Ok(()),
        Some(other) => Err(DecodeError::malformed(format!(
            "unsupported api version {other}, expected 0.6"
        ))),
        None => Err(DecodeError::malformed("missing document version")),
    }
}

#[derive(Deserialize)]
struct Document {
    version: Option<Value>,
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Element {
    Node(NodeElement),
    Way(WayElement),
    Relation(RelationElement),
}

/// The fields shared by all three element types.
#[derive(Deserialize)]
struct Common {
    id: i64,
    version: Option<i64>,
    changeset: Option<i64>,
    timestamp: Option<String>,
    uid: Option<i64>,
    user: Option<String>,
    visible: Option<bool>,
    #[serde(default)]
    tags: Tags,
}

#[derive(Deserialize)]
struct NodeElement {
    #[serde(flatten)]
    common: Common,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Deserialize)]
struct WayElement {
    #[serde(flatten)]
    common: Common,
    #[serde(default)]
    nodes: Vec<i64>,
}

#[derive(Deserialize)]
struct RelationElement {
    #[serde(flatten)]
    common: Common,
    #[serde(default)]
    members: Vec<MemberElement>,
}

#[derive(Deserialize)]
struct MemberElement {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "ref")]
    reference: i64,
    #[serde(default)]
    role: String,
}

/// Applies the shared validation rules to one element's common fields.
fn build_meta(common: Common, kind: PrimitiveKind) -> Result<Meta, DecodeError> {
    let id = common.id;
    if id == 0 {
        return Err(DecodeError::malformed(format!("illegal {kind} with id 0")));
    }
    let mut meta = Meta::new(id);

    match common.version {
        Some(version) => {
            if id > 0 {
                if version <= 0 {
                    return Err(DecodeError::malformed(format!(
                        "illegal version {version} for {} with a server id",
                        PrimitiveId::new(kind, id)
                    )));
                }
                meta.version = version as u32;
            } else if version < 0 {
                warn!(
                    "normalizing negative version {version} of local {} to 0",
                    PrimitiveId::new(kind, id)
                );
            } else {
                meta.version = version as u32;
            }
        }
        None if id > 0 => {
            return Err(DecodeError::malformed(format!(
                "missing mandatory version on {} with a server id",
                PrimitiveId::new(kind, id)
            )));
        }
        None => {}
    }

    match common.changeset {
        None => {}
        Some(changeset) if changeset >= 0 => meta.changeset = changeset,
        Some(changeset) if id <= 0 => {
            warn!(
                "resetting negative changeset {changeset} of local {} to 0",
                PrimitiveId::new(kind, id)
            );
        }
        Some(changeset) => {
            return Err(DecodeError::malformed(format!(
                "illegal changeset {changeset} on {}",
                PrimitiveId::new(kind, id)
            )));
        }
    }

    if let Some(raw) = &common.timestamp {
        let parsed = DateTime::parse_from_rfc3339(raw).map_err(|_| {
            DecodeError::malformed(format!("cannot parse timestamp '{raw}'"))
        })?;
        meta.timestamp = Some(parsed.with_timezone(&Utc));
    }

    meta.user = UserInfo::from_attributes(common.uid, common.user);
    if let Some(visible) = common.visible {
        meta.visible = visible;
    }
    meta.tags = common.tags;

    Ok(meta)
}

fn commit_node(element: NodeElement, sink: &mut impl FragmentSink) -> Result<(), DecodeError> {
    let meta = build_meta(element.common, PrimitiveKind::Node)?;
    let coordinate = match (element.lat, element.lon) {
        (None, None) => None,
        (Some(lat), Some(lon)) => {
            let coordinate = LatLon::new(lat, lon);
            if !coordinate.is_valid() {
                return Err(DecodeError::malformed(format!(
                    "coordinate {coordinate} of node {} is out of range",
                    meta.id
                )));
            }
            Some(coordinate)
        }
        _ => {
            return Err(DecodeError::malformed(format!(
                "node {} carries only one of lat/lon",
                meta.id
            )));
        }
    };
    sink.push_node(Node::new(meta, coordinate));
    Ok(())
}

fn commit_way(element: WayElement, sink: &mut impl FragmentSink) -> Result<(), DecodeError> {
    let meta = build_meta(element.common, PrimitiveKind::Way)?;
    if element.nodes.contains(&0) {
        return Err(DecodeError::malformed(format!(
            "way {} references node 0",
            meta.id
        )));
    }
    sink.push_way(Way::new(meta), element.nodes);
    Ok(())
}

fn commit_relation(
    element: RelationElement,
    sink: &mut impl FragmentSink,
) -> Result<(), DecodeError> {
    let meta = build_meta(element.common, PrimitiveKind::Relation)?;
    let mut members = Vec::with_capacity(element.members.len());
    for member in element.members {
        let kind = PrimitiveKind::from_str(&member.kind).map_err(|_| {
            DecodeError::malformed(format!(
                "illegal member type '{}' in relation {}",
                member.kind, meta.id
            ))
        })?;
        if member.reference == 0 {
            return Err(DecodeError::malformed(format!(
                "relation {} contains a member with ref 0",
                meta.id
            )));
        }
        members.push(RawMember::new(member.role, member.reference, kind));
    }
    sink.push_relation(Relation::new(meta), members);
    Ok(())
}
