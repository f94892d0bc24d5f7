//! Decodes `HeaderBlock` and `PrimitiveBlock` payloads into fragment
//! sink calls.
//!
//! Dense nodes are the crux: ids, coordinates and attribution arrive as
//! parallel delta-encoded arrays, and the key/value array is a sequence
//! of runs separated by the string-table sentinel index 0. Running
//! accumulators reconstruct the absolute values; any length mismatch
//! between the parallel arrays is a structural error.

use itertools::izip;
use log::trace;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::DecodeError;
use crate::primitive::{
    Bounds, DataSource, LatLon, Meta, Node, PrimitiveKind, Relation, Tags, UserInfo, Way,
};
use crate::sink::{FragmentSink, RawMember};

use super::proto;
use super::proto::relation::MemberType;

/// The features this decoder implements. A payload requiring anything
/// else must be rejected, not half-read.
const SUPPORTED_FEATURES: [&str; 3] = ["OsmSchema-V0.6", "DenseNodes", "HistoricalInformation"];

const NANODEGREE: f64 = 1e-9;

pub(crate) fn commit_header(
    block: proto::HeaderBlock,
    sink: &mut impl FragmentSink,
) -> Result<(), DecodeError> {
    for feature in &block.required_features {
        if !SUPPORTED_FEATURES.contains(&feature.as_str()) {
            return Err(DecodeError::UnsupportedFeature(feature.clone()));
        }
    }

    // OsmSchema-V0.6 fixes the data model version.
    sink.set_version("0.6".to_string());

    if let Some(bbox) = block.bbox {
        let bounds = Bounds::new(
            LatLon::new(
                NANODEGREE * bbox.bottom as f64,
                NANODEGREE * bbox.left as f64,
            ),
            LatLon::new(NANODEGREE * bbox.top as f64, NANODEGREE * bbox.right as f64),
        );
        sink.push_source(DataSource::new(bounds, block.source));
    }
    Ok(())
}

pub(crate) fn commit_block(
    block: proto::PrimitiveBlock,
    sink: &mut impl FragmentSink,
) -> Result<(), DecodeError> {
    let strings = Strings {
        entries: block
            .stringtable
            .as_ref()
            .map(|table| table.s.as_slice())
            .unwrap_or(&[]),
    };
    let scale = Scale::of(&block);

    for group in &block.primitivegroup {
        if !group.changesets.is_empty() {
            trace!("skipping {} changesets in group", group.changesets.len());
        }
        for element in Element::from_group(group) {
            match element {
                Element::Node(node) => commit_plain_node(node, &strings, &scale, sink)?,
                Element::Dense(dense) => commit_dense_nodes(dense, &strings, &scale, sink)?,
                Element::Way(way) => commit_way(way, &strings, &scale, sink)?,
                Element::Relation(relation) => {
                    commit_relation(relation, &strings, &scale, sink)?
                }
            }
        }
    }
    Ok(())
}

/// One entity collection of a primitive group.
enum Element<'a> {
    Node(&'a proto::Node),
    Dense(&'a proto::DenseNodes),
    Way(&'a proto::Way),
    Relation(&'a proto::Relation),
}

impl<'a> Element<'a> {
    fn from_group(group: &'a proto::PrimitiveGroup) -> Vec<Element<'a>> {
        let mut elements: Vec<Element<'a>> = Vec::new();

        elements.extend(group.nodes.iter().map(Element::Node));
        if let Some(dense) = &group.dense {
            elements.push(Element::Dense(dense));
        }
        elements.extend(group.ways.iter().map(Element::Way));
        elements.extend(group.relations.iter().map(Element::Relation));

        elements
    }
}

/// Coordinate and timestamp reconstruction constants of one block.
struct Scale {
    granularity: i64,
    lat_offset: i64,
    lon_offset: i64,
    date_granularity: i64,
}

impl Scale {
    fn of(block: &proto::PrimitiveBlock) -> Scale {
        Scale {
            granularity: block.granularity() as i64,
            lat_offset: block.lat_offset(),
            lon_offset: block.lon_offset(),
            date_granularity: block.date_granularity() as i64,
        }
    }

    fn coordinate(&self, lat: i64, lon: i64) -> LatLon {
        LatLon::new(
            NANODEGREE * (self.lat_offset + self.granularity * lat) as f64,
            NANODEGREE * (self.lon_offset + self.granularity * lon) as f64,
        )
    }

    fn timestamp(&self, raw: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(raw * self.date_granularity).single()
    }
}

/// The block's interned string table.
struct Strings<'a> {
    entries: &'a [Vec<u8>],
}

impl Strings<'_> {
    fn recover(&self, index: i64) -> Result<String, DecodeError> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.entries.get(index))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .ok_or_else(|| {
                DecodeError::malformed(format!(
                    "string table index {index} out of range for table of {}",
                    self.entries.len()
                ))
            })
    }
}

fn recover_tags(keys: &[u32], vals: &[u32], strings: &Strings) -> Result<Tags, DecodeError> {
    if keys.len() != vals.len() {
        return Err(DecodeError::malformed(format!(
            "tag arrays disagree in length: {} keys, {} values",
            keys.len(),
            vals.len()
        )));
    }
    izip!(keys, vals)
        .map(|(&key, &value)| {
            Ok((
                strings.recover(key as i64)?,
                strings.recover(value as i64)?,
            ))
        })
        .collect()
}

fn recover_meta(
    id: i64,
    info: Option<&proto::Info>,
    strings: &Strings,
    scale: &Scale,
) -> Result<Meta, DecodeError> {
    let mut meta = Meta::new(id);
    if let Some(info) = info {
        meta.version = info.version.unwrap_or(0).max(0) as u32;
        meta.visible = info.visible.unwrap_or(true);
        meta.changeset = info.changeset.unwrap_or(0);
        meta.timestamp = info.timestamp.and_then(|raw| scale.timestamp(raw));

        let name = match info.user_sid {
            Some(sid) if sid != 0 => Some(strings.recover(sid as i64)?),
            _ => None,
        };
        let uid = info.uid.filter(|&uid| uid > 0).map(i64::from);
        meta.user = UserInfo::from_attributes(uid, name.filter(|name| !name.is_empty()));
    }
    Ok(meta)
}

fn commit_plain_node(
    node: &proto::Node,
    strings: &Strings,
    scale: &Scale,
    sink: &mut impl FragmentSink,
) -> Result<(), DecodeError> {
    let mut meta = recover_meta(node.id, node.info.as_ref(), strings, scale)?;
    meta.tags = recover_tags(&node.keys, &node.vals, strings)?;
    sink.push_node(Node::new(meta, Some(scale.coordinate(node.lat, node.lon))));
    Ok(())
}

fn commit_dense_nodes(
    dense: &proto::DenseNodes,
    strings: &Strings,
    scale: &Scale,
    sink: &mut impl FragmentSink,
) -> Result<(), DecodeError> {
    let count = dense.id.len();
    if dense.lat.len() != count || dense.lon.len() != count {
        return Err(DecodeError::malformed(format!(
            "dense node arrays disagree in length: {count} ids, {} lats, {} lons",
            dense.lat.len(),
            dense.lon.len()
        )));
    }
    let info = match &dense.denseinfo {
        Some(info) => {
            let parallel = [
                info.version.len(),
                info.timestamp.len(),
                info.changeset.len(),
                info.uid.len(),
                info.user_sid.len(),
            ];
            if parallel.iter().any(|&len| len != count)
                || (!info.visible.is_empty() && info.visible.len() != count)
            {
                return Err(DecodeError::malformed(format!(
                    "dense info arrays disagree with the {count} node ids"
                )));
            }
            Some(info)
        }
        None => None,
    };

    // Running accumulators for the delta-encoded columns.
    let (mut id, mut lat, mut lon) = (0_i64, 0_i64, 0_i64);
    let (mut timestamp, mut changeset) = (0_i64, 0_i64);
    let (mut uid, mut user_sid) = (0_i32, 0_i32);
    let mut runs = dense.keys_vals.as_slice();

    for (index, (delta_id, delta_lat, delta_lon)) in
        izip!(&dense.id, &dense.lat, &dense.lon).enumerate()
    {
        id += delta_id;
        lat += delta_lat;
        lon += delta_lon;

        let mut meta = Meta::new(id);
        meta.tags = next_tag_run(&mut runs, strings)?;

        if let Some(info) = info {
            timestamp += info.timestamp[index];
            changeset += info.changeset[index];
            uid += info.uid[index];
            user_sid += info.user_sid[index];

            meta.version = info.version[index].max(0) as u32;
            meta.visible = info.visible.get(index).copied().unwrap_or(true);
            meta.changeset = changeset;
            meta.timestamp = scale.timestamp(timestamp);

            let name = match user_sid {
                0 => None,
                sid => Some(strings.recover(sid as i64)?).filter(|name| !name.is_empty()),
            };
            meta.user = UserInfo::from_attributes((uid > 0).then_some(uid as i64), name);
        }

        sink.push_node(Node::new(meta, Some(scale.coordinate(lat, lon))));
    }

    if !runs.is_empty() {
        return Err(DecodeError::malformed(
            "dense key/value runs outlive the node id array",
        ));
    }
    Ok(())
}

/// Consumes one tag run off the packed key/value array: (key, value)
/// index pairs until the sentinel 0 ends the current node's tags.
fn next_tag_run(runs: &mut &[i32], strings: &Strings) -> Result<Tags, DecodeError> {
    let mut tags = Tags::new();
    loop {
        match *runs {
            [] => return Ok(tags),
            [0, rest @ ..] => {
                *runs = rest;
                return Ok(tags);
            }
            [key, value, rest @ ..] => {
                tags.insert(
                    strings.recover(*key as i64)?,
                    strings.recover(*value as i64)?,
                );
                *runs = rest;
            }
            [key] => {
                return Err(DecodeError::malformed(format!(
                    "dense tag key {key} without a value"
                )));
            }
        }
    }
}

fn commit_way(
    way: &proto::Way,
    strings: &Strings,
    scale: &Scale,
    sink: &mut impl FragmentSink,
) -> Result<(), DecodeError> {
    let mut meta = recover_meta(way.id, way.info.as_ref(), strings, scale)?;
    meta.tags = recover_tags(&way.keys, &way.vals, strings)?;

    if !way.lat.is_empty() || !way.lon.is_empty() {
        // Optional LocationsOnWays coordinates; node lookups through the
        // resolution engine stay authoritative.
        trace!("ignoring LocationsOnWays coordinates on way {}", way.id);
    }

    let mut node_ids = Vec::with_capacity(way.refs.len());
    let mut acc = 0_i64;
    for delta in &way.refs {
        acc += delta;
        if acc == 0 {
            return Err(DecodeError::malformed(format!(
                "way {} references node 0",
                way.id
            )));
        }
        node_ids.push(acc);
    }

    sink.push_way(Way::new(meta), node_ids);
    Ok(())
}

fn commit_relation(
    relation: &proto::Relation,
    strings: &Strings,
    scale: &Scale,
    sink: &mut impl FragmentSink,
) -> Result<(), DecodeError> {
    let mut meta = recover_meta(relation.id, relation.info.as_ref(), strings, scale)?;
    meta.tags = recover_tags(&relation.keys, &relation.vals, strings)?;

    let count = relation.memids.len();
    if relation.roles_sid.len() != count || relation.types.len() != count {
        return Err(DecodeError::malformed(format!(
            "relation {} member arrays disagree in length: {} roles, {count} ids, {} types",
            relation.id,
            relation.roles_sid.len(),
            relation.types.len()
        )));
    }

    let mut members = Vec::with_capacity(count);
    let mut acc = 0_i64;
    for (role_sid, delta, member_type) in
        izip!(&relation.roles_sid, &relation.memids, &relation.types)
    {
        acc += delta;
        if acc == 0 {
            return Err(DecodeError::malformed(format!(
                "relation {} contains a member with ref 0",
                relation.id
            )));
        }
        let kind = match MemberType::try_from(*member_type) {
            Ok(MemberType::Node) => PrimitiveKind::Node,
            Ok(MemberType::Way) => PrimitiveKind::Way,
            Ok(MemberType::Relation) => PrimitiveKind::Relation,
            Err(_) => {
                return Err(DecodeError::malformed(format!(
                    "unknown member type {member_type} in relation {}",
                    relation.id
                )));
            }
        };
        members.push(RawMember::new(
            strings.recover(*role_sid as i64)?,
            acc,
            kind,
        ));
    }

    sink.push_relation(Relation::new(meta), members);
    Ok(())
}
