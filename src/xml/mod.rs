//! The streaming-XML decoder and writer for the `.osm` dialect.
//!
//! The event loop is an explicit state machine: a stack of [`Scope`]
//! values mirrors the open-element nesting, and every (scope, element)
//! pair has exactly one transition. Errors carry the 1-based
//! line/column where the offending element ends, taken from the
//! byte-counting reader underneath quick-xml.

pub(crate) mod reader;
mod write;

#[doc(hidden)]
pub mod test;

pub use write::write;

use std::io::Read;
use std::str::FromStr;

use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use smallvec::SmallVec;

use chrono::{DateTime, Utc};

use crate::error::DecodeError;
use crate::options::Options;
use crate::primitive::{
    Bounds, DataSource, DownloadPolicy, LatLon, Meta, Node, PrimitiveId, PrimitiveKind,
    PrimitiveStore, Relation, UploadPolicy, UserInfo, Way,
};
use crate::resolve::resolve;
use crate::sink::{FragmentSink, Fragments, RawMember};
use crate::Error;

use reader::PositionedReader;

/// Parses an OSM-XML byte stream into a resolved primitive store.
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
    let mut reader = Reader::from_reader(PositionedReader::new(read));
    reader.trim_text(true);

    let mut parser = Parser {
        sink,
        stack: SmallVec::new(),
        seen_root: false,
    };
    let mut buf = Vec::new();

    loop {
        options.check()?;
        let event = reader.read_event_into(&mut buf);
        let position = reader.get_ref().position();
        match event {
            Err(err) => return Err(DecodeError::from(err).at(position)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => {
                parser.open(&start, false).map_err(|err| err.at(position))?
            }
            Ok(Event::Empty(start)) => {
                parser.open(&start, true).map_err(|err| err.at(position))?
            }
            Ok(Event::End(_)) => parser.close().map_err(|err| err.at(position))?,
            // Character data between elements carries nothing in this
            // dialect.
            Ok(_) => {}
        }
        buf.clear();
    }

    if !parser.seen_root {
        return Err(DecodeError::malformed("missing root element 'osm'"));
    }
    Ok(())
}

/// One open element the decoder is inside of.
enum Scope {
    Osm,
    Bounds,
    Node(Node),
    Way(Way, Vec<i64>),
    Relation(Relation, Vec<RawMember>),
    Changeset,
    /// A child leaf (`tag`, `nd`, `member`) already applied at open.
    Leaf,
    /// An unknown subtree being skipped.
    Foreign,
}

struct Parser<'a, S> {
    sink: &'a mut S,
    stack: SmallVec<[Scope; 8]>,
    seen_root: bool,
}

impl<S: FragmentSink> Parser<'_, S> {
    fn open(&mut self, start: &BytesStart, empty: bool) -> Result<(), DecodeError> {
        if matches!(self.stack.last(), Some(Scope::Foreign)) {
            if !empty {
                self.stack.push(Scope::Foreign);
            }
            return Ok(());
        }

        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let attributes = Attributes::of(start)?;

        let scope = match self.stack.last_mut() {
            None => match name.as_str() {
                "osm" => {
                    self.seen_root = true;
                    open_root(&attributes, self.sink)?
                }
                other => {
                    return Err(DecodeError::malformed(format!(
                        "unexpected root element '{other}', expected 'osm'"
                    )));
                }
            },

            Some(Scope::Osm) => match name.as_str() {
                "bounds" => {
                    self.sink.push_source(parse_bounds(&attributes)?);
                    Scope::Bounds
                }
                "node" => {
                    let meta = parse_meta(&attributes, PrimitiveKind::Node)?;
                    let coordinate = parse_coordinate_pair(&attributes, meta.id)?;
                    Scope::Node(Node::new(meta, coordinate))
                }
                "way" => {
                    let meta = parse_meta(&attributes, PrimitiveKind::Way)?;
                    Scope::Way(Way::new(meta), Vec::new())
                }
                "relation" => {
                    let meta = parse_meta(&attributes, PrimitiveKind::Relation)?;
                    Scope::Relation(Relation::new(meta), Vec::new())
                }
                "changeset" => Scope::Changeset,
                other => {
                    warn!("skipping unknown element '{other}'");
                    Scope::Foreign
                }
            },

            Some(Scope::Node(node)) => match name.as_str() {
                "tag" => {
                    let (key, value) = parse_tag(&attributes)?;
                    node.meta.tags.insert(key, value);
                    Scope::Leaf
                }
                "nd" => return Err(misplaced("nd", "way")),
                "member" => return Err(misplaced("member", "relation")),
                other => {
                    warn!("skipping unknown element '{other}'");
                    Scope::Foreign
                }
            },

            Some(Scope::Way(way, node_ids)) => match name.as_str() {
                "nd" => {
                    node_ids.push(parse_reference(&attributes, "nd")?);
                    Scope::Leaf
                }
                "tag" => {
                    let (key, value) = parse_tag(&attributes)?;
                    way.meta.tags.insert(key, value);
                    Scope::Leaf
                }
                "member" => return Err(misplaced("member", "relation")),
                other => {
                    warn!("skipping unknown element '{other}'");
                    Scope::Foreign
                }
            },

            Some(Scope::Relation(relation, members)) => match name.as_str() {
                "member" => {
                    members.push(parse_member(&attributes)?);
                    Scope::Leaf
                }
                "tag" => {
                    let (key, value) = parse_tag(&attributes)?;
                    relation.meta.tags.insert(key, value);
                    Scope::Leaf
                }
                "nd" => return Err(misplaced("nd", "way")),
                other => {
                    warn!("skipping unknown element '{other}'");
                    Scope::Foreign
                }
            },

            Some(Scope::Changeset) => match name.as_str() {
                "tag" => {
                    let (key, value) = parse_tag(&attributes)?;
                    self.sink.push_changeset_tag(key, value);
                    Scope::Leaf
                }
                other => {
                    warn!("skipping unknown element '{other}'");
                    Scope::Foreign
                }
            },

            Some(Scope::Bounds | Scope::Leaf | Scope::Foreign) => {
                warn!("skipping unknown element '{name}'");
                Scope::Foreign
            }
        };

        if empty {
            self.exit(scope)
        } else {
            self.stack.push(scope);
            Ok(())
        }
    }

    fn close(&mut self) -> Result<(), DecodeError> {
        match self.stack.pop() {
            Some(scope) => self.exit(scope),
            None => Err(DecodeError::malformed("unexpected closing tag")),
        }
    }

    /// Commits a finished element to the sink.
    fn exit(&mut self, scope: Scope) -> Result<(), DecodeError> {
        match scope {
            Scope::Node(node) => self.sink.push_node(node),
            Scope::Way(way, node_ids) => self.sink.push_way(way, node_ids),
            Scope::Relation(relation, members) => self.sink.push_relation(relation, members),
            _ => {}
        }
        Ok(())
    }
}

fn misplaced(element: &str, parent: &str) -> DecodeError {
    DecodeError::malformed(format!(
        "element '{element}' is only valid inside '{parent}'"
    ))
}

/// Applies the root element's attributes to the sink.
fn open_root(attributes: &Attributes, sink: &mut impl FragmentSink) -> Result<Scope, DecodeError> {
    let version = attributes.required("osm", "version")?;
    if version != "0.6" {
        return Err(DecodeError::malformed(format!(
            "unsupported api version '{version}', expected '0.6'"
        )));
    }
    sink.set_version(version.to_string());

    if let Some(raw) = attributes.get("upload") {
        let policy = UploadPolicy::from_str(raw)
            .map_err(|_| illegal_value("upload", raw))?;
        sink.set_upload_policy(policy);
    }
    if let Some(raw) = attributes.get("download") {
        let policy = DownloadPolicy::from_str(raw)
            .map_err(|_| illegal_value("download", raw))?;
        sink.set_download_policy(policy);
    }
    if let Some(raw) = attributes.get("locked") {
        match raw {
            "true" => sink.lock(),
            "false" => {}
            other => return Err(illegal_value("locked", other)),
        }
    }
    Ok(Scope::Osm)
}

fn parse_bounds(attributes: &Attributes) -> Result<DataSource, DecodeError> {
    let min = LatLon::new(
        parse_coordinate("minlat", attributes.required("bounds", "minlat")?)?,
        parse_coordinate("minlon", attributes.required("bounds", "minlon")?)?,
    );
    let max = LatLon::new(
        parse_coordinate("maxlat", attributes.required("bounds", "maxlat")?)?,
        parse_coordinate("maxlon", attributes.required("bounds", "maxlon")?)?,
    );
    let origin = attributes.get("origin").map(str::to_string);
    Ok(DataSource::new(Bounds::new(min, max), origin))
}

/// Reads the attributes common to nodes, ways and relations.
fn parse_meta(attributes: &Attributes, kind: PrimitiveKind) -> Result<Meta, DecodeError> {
    let element = kind.to_string();
    let id: i64 = attributes.required_parsed(&element, "id")?;
    if id == 0 {
        return Err(DecodeError::malformed(format!(
            "illegal {element} with id 0"
        )));
    }
    let mut meta = Meta::new(id);

    match attributes.get("version") {
        Some(raw) => {
            let version: i64 = raw
                .parse()
                .map_err(|_| illegal_value("version", raw))?;
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

    match attributes.get("changeset") {
        None => {}
        Some("") => {}
        Some(raw) => match raw.parse::<i64>() {
            Ok(changeset) if changeset >= 0 => meta.changeset = changeset,
            _ if id <= 0 => {
                warn!(
                    "resetting invalid changeset '{raw}' of local {} to 0",
                    PrimitiveId::new(kind, id)
                );
            }
            _ => return Err(illegal_value("changeset", raw)),
        },
    }

    if let Some(raw) = attributes.get("timestamp") {
        let parsed = DateTime::parse_from_rfc3339(raw)
            .map_err(|_| illegal_value("timestamp", raw))?;
        meta.timestamp = Some(parsed.with_timezone(&Utc));
    }

    let uid = attributes
        .get("uid")
        .map(|raw| raw.parse::<i64>().map_err(|_| illegal_value("uid", raw)))
        .transpose()?;
    meta.user = UserInfo::from_attributes(uid, attributes.get("user").map(str::to_string));

    if let Some(raw) = attributes.get("visible") {
        meta.visible = match raw {
            "true" => true,
            "false" => false,
            other => return Err(illegal_value("visible", other)),
        };
    }
    if attributes.get("action") == Some("delete") {
        meta.visible = false;
    }

    Ok(meta)
}

/// Nodes carry `lat`/`lon` together or not at all.
fn parse_coordinate_pair(
    attributes: &Attributes,
    id: i64,
) -> Result<Option<LatLon>, DecodeError> {
    match (attributes.get("lat"), attributes.get("lon")) {
        (None, None) => Ok(None),
        (Some(lat), Some(lon)) => Ok(Some(LatLon::new(
            parse_coordinate("lat", lat)?,
            parse_coordinate("lon", lon)?,
        ))),
        _ => Err(DecodeError::malformed(format!(
            "node {id} carries only one of lat/lon"
        ))),
    }
}

fn parse_coordinate(name: &str, raw: &str) -> Result<f64, DecodeError> {
    let value: f64 = raw.parse().map_err(|_| illegal_value(name, raw))?;
    let limit = if name.ends_with("lat") { 90.0 } else { 180.0 };
    if !value.is_finite() || value.abs() > limit {
        return Err(DecodeError::malformed(format!(
            "value {raw} for attribute '{name}' is out of range"
        )));
    }
    Ok(value)
}

fn parse_tag(attributes: &Attributes) -> Result<(String, String), DecodeError> {
    Ok((
        attributes.required("tag", "k")?.to_string(),
        attributes.required("tag", "v")?.to_string(),
    ))
}

fn parse_reference(attributes: &Attributes, element: &str) -> Result<i64, DecodeError> {
    let reference: i64 = attributes.required_parsed(element, "ref")?;
    if reference == 0 {
        return Err(DecodeError::malformed(format!(
            "element '{element}' references id 0"
        )));
    }
    Ok(reference)
}

fn parse_member(attributes: &Attributes) -> Result<RawMember, DecodeError> {
    let raw_kind = attributes.required("member", "type")?;
    let kind = PrimitiveKind::from_str(raw_kind).map_err(|_| illegal_value("type", raw_kind))?;
    let reference = parse_reference(attributes, "member")?;
    let role = attributes.get("role").unwrap_or("").to_string();
    Ok(RawMember::new(role, reference, kind))
}

fn illegal_value(attribute: &str, value: &str) -> DecodeError {
    DecodeError::malformed(format!(
        "illegal value for attribute '{attribute}': '{value}'"
    ))
}

/// The unescaped attributes of one element.
struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    fn of(start: &BytesStart) -> Result<Attributes, DecodeError> {
        let mut entries = Vec::new();
        for attribute in start.attributes() {
            let attribute =
                attribute.map_err(|err| DecodeError::malformed(err.to_string()))?;
            entries.push((
                String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
                attribute.unescape_value()?.into_owned(),
            ));
        }
        Ok(Attributes { entries })
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn required(&self, element: &str, name: &str) -> Result<&str, DecodeError> {
        self.get(name).ok_or_else(|| {
            DecodeError::malformed(format!(
                "missing mandatory attribute '{name}' on element '{element}'"
            ))
        })
    }

    fn required_parsed<T: FromStr>(&self, element: &str, name: &str) -> Result<T, DecodeError> {
        let raw = self.required(element, name)?;
        raw.parse().map_err(|_| illegal_value(name, raw))
    }
}
