//! The GeoJSON decoder.
//!
//! GeoJSON carries no OSM identities, so every entity is synthesized
//! with a fresh local id from the sink. Geometries map onto the entity
//! model: points become nodes, line strings become ways, polygons with
//! holes become multipolygon relations. Nodes are shared whenever two
//! positions are bit-identical, so touching rings reuse the same node.
//!
//! Both plain documents and RFC 7464 record-separated streams (each
//! record prefixed by 0x1E) are accepted.

use std::io::Read;

use either::Either;
use log::warn;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::DecodeError;
use crate::options::Options;
use crate::primitive::{
    Bounds, DataSource, LatLon, Meta, Node, PrimitiveKind, PrimitiveStore, Relation, Tags,
    UploadPolicy, Way,
};
use crate::resolve::resolve;
use crate::sink::{FragmentSink, Fragments, RawMember};
use crate::Error;

const RECORD_SEPARATOR: char = '\u{1e}';

/// Parses a GeoJSON byte stream into a resolved primitive store.
pub fn parse<R: Read>(mut read: R, options: &Options) -> Result<PrimitiveStore, Error> {
    let mut text = String::new();
    read.read_to_string(&mut text).map_err(DecodeError::from)?;

    let mut fragments = Fragments::new();
    decode(&text, options, &mut fragments)?;
    resolve(fragments, options)
}

fn decode(
    text: &str,
    options: &Options,
    sink: &mut impl FragmentSink,
) -> Result<(), DecodeError> {
    let records = if text.contains(RECORD_SEPARATOR) {
        Either::Left(
            text.split(RECORD_SEPARATOR)
                .map(str::trim)
                .filter(|record| !record.is_empty()),
        )
    } else {
        Either::Right(std::iter::once(text.trim()))
    };

    let mut builder = Builder {
        sink,
        nodes: FxHashMap::default(),
    };
    for record in records {
        options.check()?;
        let value: Value = serde_json::from_str(record)?;
        builder.document(&value, options)?;
    }

    // Synthesized entities carry made-up identities; pushing them back
    // to a server is rarely what the user wants.
    builder.sink.set_upload_policy(UploadPolicy::Discouraged);
    Ok(())
}

struct Builder<'a, S> {
    sink: &'a mut S,
    /// Bit-identical positions share one node.
    nodes: FxHashMap<(u64, u64), i64>,
}

impl<S: FragmentSink> Builder<'_, S> {
    fn document(&mut self, value: &Value, options: &Options) -> Result<(), DecodeError> {
        match value.get("type").and_then(Value::as_str) {
            Some("FeatureCollection") => {
                if let Some(bbox) = value.get("bbox") {
                    self.bbox(bbox)?;
                }
                let features = value
                    .get("features")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        DecodeError::malformed("feature collection without a features array")
                    })?;
                for feature in features {
                    options.check()?;
                    self.feature(feature)?;
                }
                Ok(())
            }
            Some("Feature") => self.feature(value),
            Some(_) => self.geometry(value, Tags::new()).map(|_| ()),
            None => Err(DecodeError::malformed(
                "document object carries no 'type' member",
            )),
        }
    }

    /// GeoJSON bbox order is west, south, east, north.
    fn bbox(&mut self, value: &Value) -> Result<(), DecodeError> {
        let Some(corners) = value.as_array() else {
            return Err(DecodeError::malformed("bbox is not an array"));
        };
        if corners.len() < 4 {
            return Err(DecodeError::malformed(format!(
                "bbox carries {} values, expected 4",
                corners.len()
            )));
        }
        let mut numbers = [0.0; 4];
        for (slot, corner) in numbers.iter_mut().zip(corners) {
            *slot = corner
                .as_f64()
                .ok_or_else(|| DecodeError::malformed("bbox carries a non-numeric corner"))?;
        }
        let bounds = Bounds::new(
            LatLon::new(numbers[1], numbers[0]),
            LatLon::new(numbers[3], numbers[2]),
        );
        self.sink.push_source(DataSource::new(bounds, None));
        Ok(())
    }

    fn feature(&mut self, value: &Value) -> Result<(), DecodeError> {
        match value.get("geometry") {
            Some(geometry) if !geometry.is_null() => {
                let tags = properties_to_tags(value.get("properties"));
                self.geometry(geometry, tags)?;
                Ok(())
            }
            _ => {
                warn!("skipping feature without a geometry");
                Ok(())
            }
        }
    }

    /// Commits one geometry and returns the identity of the entity that
    /// carries its tags.
    fn geometry(
        &mut self,
        value: &Value,
        tags: Tags,
    ) -> Result<(PrimitiveKind, i64), DecodeError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::malformed("geometry carries no 'type' member"))?;

        match kind {
            "Point" => {
                let position = position(coordinates(value)?)?;
                let id = self.node(position, tags)?;
                Ok((PrimitiveKind::Node, id))
            }
            "MultiPoint" => {
                let mut members = Vec::new();
                for point in positions(coordinates(value)?)? {
                    let id = self.node(point, Tags::new())?;
                    members.push(RawMember::new("", id, PrimitiveKind::Node));
                }
                Ok((PrimitiveKind::Relation, self.relation(members, tags)))
            }
            "LineString" => {
                let points = positions(coordinates(value)?)?;
                let id = self.way(&points, false, tags)?;
                Ok((PrimitiveKind::Way, id))
            }
            "MultiLineString" => {
                let mut members = Vec::new();
                for line in lines(coordinates(value)?)? {
                    let id = self.way(&line, false, Tags::new())?;
                    members.push(RawMember::new("", id, PrimitiveKind::Way));
                }
                Ok((PrimitiveKind::Relation, self.relation(members, tags)))
            }
            "Polygon" => self.polygon(coordinates(value)?, tags),
            "MultiPolygon" => {
                let rings = coordinates(value)?
                    .as_array()
                    .ok_or_else(|| DecodeError::malformed("MultiPolygon is not an array"))?;
                let mut members = Vec::new();
                for polygon in rings {
                    self.polygon_rings(polygon, &mut members)?;
                }
                let mut tags = tags;
                tags.insert("type", "multipolygon");
                Ok((PrimitiveKind::Relation, self.relation(members, tags)))
            }
            "GeometryCollection" => {
                let geometries = value
                    .get("geometries")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        DecodeError::malformed("geometry collection without a geometries array")
                    })?;
                let mut members = Vec::new();
                for geometry in geometries {
                    let (kind, id) = self.geometry(geometry, Tags::new())?;
                    members.push(RawMember::new("", id, kind));
                }
                Ok((PrimitiveKind::Relation, self.relation(members, tags)))
            }
            other => Err(DecodeError::malformed(format!(
                "unknown geometry type '{other}'"
            ))),
        }
    }

    /// A polygon is a closed way when it has a single ring, a
    /// multipolygon relation when it carries holes.
    fn polygon(&mut self, rings: &Value, tags: Tags) -> Result<(PrimitiveKind, i64), DecodeError> {
        let entries = rings
            .as_array()
            .ok_or_else(|| DecodeError::malformed("Polygon is not an array of rings"))?;
        match entries.as_slice() {
            [] => Err(DecodeError::malformed("Polygon carries no rings")),
            [ring] => {
                let points = positions(ring)?;
                let id = self.way(&points, true, tags)?;
                Ok((PrimitiveKind::Way, id))
            }
            _ => {
                let mut members = Vec::new();
                self.polygon_rings(rings, &mut members)?;
                let mut tags = tags;
                tags.insert("type", "multipolygon");
                Ok((PrimitiveKind::Relation, self.relation(members, tags)))
            }
        }
    }

    /// Commits one polygon's rings as closed ways: the first ring is the
    /// outer boundary, the rest are holes.
    fn polygon_rings(
        &mut self,
        rings: &Value,
        members: &mut Vec<RawMember>,
    ) -> Result<(), DecodeError> {
        let entries = rings
            .as_array()
            .ok_or_else(|| DecodeError::malformed("polygon is not an array of rings"))?;
        for (index, ring) in entries.iter().enumerate() {
            let role = if index == 0 { "outer" } else { "inner" };
            let points = positions(ring)?;
            let id = self.way(&points, true, Tags::new())?;
            members.push(RawMember::new(role, id, PrimitiveKind::Way));
        }
        Ok(())
    }

    fn node(&mut self, position: LatLon, tags: Tags) -> Result<i64, DecodeError> {
        if !position.is_valid() {
            return Err(DecodeError::malformed(format!(
                "coordinate {position} is out of range"
            )));
        }
        let key = (position.lat.to_bits(), position.lon.to_bits());
        if let Some(&id) = self.nodes.get(&key) {
            // Tags on a reused position would silently merge; keep the
            // first committed node authoritative.
            return Ok(id);
        }

        let id = self.sink.next_local_id(PrimitiveKind::Node);
        self.nodes.insert(key, id);
        let mut meta = Meta::new(id);
        meta.tags = tags;
        self.sink.push_node(Node::new(meta, Some(position)));
        Ok(id)
    }

    fn way(&mut self, points: &[LatLon], close: bool, tags: Tags) -> Result<i64, DecodeError> {
        let mut node_ids = Vec::with_capacity(points.len() + usize::from(close));
        for &point in points {
            let id = self.node(point, Tags::new())?;
            // Consecutive duplicates collapse to one reference.
            if node_ids.last() != Some(&id) {
                node_ids.push(id);
            }
        }
        if close {
            match (node_ids.first().copied(), node_ids.last()) {
                (Some(first), Some(&last)) if first != last => node_ids.push(first),
                _ => {}
            }
        }

        let id = self.sink.next_local_id(PrimitiveKind::Way);
        let mut meta = Meta::new(id);
        meta.tags = tags;
        self.sink.push_way(Way::new(meta), node_ids);
        Ok(id)
    }

    fn relation(&mut self, members: Vec<RawMember>, tags: Tags) -> i64 {
        let id = self.sink.next_local_id(PrimitiveKind::Relation);
        let mut meta = Meta::new(id);
        meta.tags = tags;
        self.sink.push_relation(Relation::new(meta), members);
        id
    }
}

fn coordinates(geometry: &Value) -> Result<&Value, DecodeError> {
    geometry
        .get("coordinates")
        .ok_or_else(|| DecodeError::malformed("geometry carries no coordinates"))
}

/// One GeoJSON position: `[lon, lat]`, possibly with extra dimensions.
fn position(value: &Value) -> Result<LatLon, DecodeError> {
    let entries = value
        .as_array()
        .ok_or_else(|| DecodeError::malformed("position is not an array"))?;
    match entries.as_slice() {
        [lon, lat, ..] => match (lon.as_f64(), lat.as_f64()) {
            (Some(lon), Some(lat)) => Ok(LatLon::new(lat, lon)),
            _ => Err(DecodeError::malformed("position carries non-numeric values")),
        },
        _ => Err(DecodeError::malformed(format!(
            "position carries {} values, expected at least 2",
            entries.len()
        ))),
    }
}

fn positions(value: &Value) -> Result<Vec<LatLon>, DecodeError> {
    value
        .as_array()
        .ok_or_else(|| DecodeError::malformed("expected an array of positions"))?
        .iter()
        .map(position)
        .collect()
}

fn lines(value: &Value) -> Result<Vec<Vec<LatLon>>, DecodeError> {
    value
        .as_array()
        .ok_or_else(|| DecodeError::malformed("expected an array of line strings"))?
        .iter()
        .map(positions)
        .collect()
}

/// Feature properties become tags: strings verbatim, other scalars in
/// their JSON rendering. Nested structures carry no tag value.
fn properties_to_tags(properties: Option<&Value>) -> Tags {
    let mut tags = Tags::new();
    let Some(Value::Object(entries)) = properties else {
        return tags;
    };
    for (key, value) in entries {
        match value {
            Value::String(text) => tags.insert(key.as_str(), text.as_str()),
            Value::Null | Value::Bool(_) | Value::Number(_) => {
                tags.insert(key.as_str(), value.to_string());
            }
            Value::Array(_) | Value::Object(_) => {
                warn!("dropping non-scalar property '{key}'");
            }
        }
    }
    tags
}
