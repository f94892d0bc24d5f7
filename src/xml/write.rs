//! Serializes a primitive store back to the `.osm` XML dialect.
//!
//! The output is the decoder's input language: nodes, then ways, then
//! relations, each with its common attributes, tags and references.
//! Incomplete placeholders carry no real content and are skipped.

use std::io::Write;

use chrono::SecondsFormat;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::error::DecodeError;
use crate::primitive::{
    DownloadPolicy, Meta, Node, PrimitiveStore, Relation, Tags, UploadPolicy, UserInfo, Way,
};
use crate::Error;

const GENERATOR: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Writes the store as an OSM-XML document.
pub fn write<W: Write>(store: &PrimitiveStore, write: W) -> Result<(), Error> {
    let mut writer = Writer::new_with_indent(write, b' ', 2);
    emit(store, &mut writer)?;
    Ok(())
}

fn emit<W: Write>(store: &PrimitiveStore, writer: &mut Writer<W>) -> Result<(), DecodeError> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut osm = BytesStart::new("osm");
    osm.push_attribute(("version", store.version().unwrap_or("0.6")));
    osm.push_attribute(("generator", GENERATOR));
    if store.upload_policy() != UploadPolicy::Normal {
        osm.push_attribute(("upload", store.upload_policy().to_string().as_str()));
    }
    if store.download_policy() != DownloadPolicy::Normal {
        osm.push_attribute(("download", store.download_policy().to_string().as_str()));
    }
    if store.is_locked() {
        osm.push_attribute(("locked", "true"));
    }
    writer.write_event(Event::Start(osm))?;

    for source in store.sources() {
        let mut bounds = BytesStart::new("bounds");
        bounds.push_attribute(("minlat", source.bounds.min.lat.to_string().as_str()));
        bounds.push_attribute(("minlon", source.bounds.min.lon.to_string().as_str()));
        bounds.push_attribute(("maxlat", source.bounds.max.lat.to_string().as_str()));
        bounds.push_attribute(("maxlon", source.bounds.max.lon.to_string().as_str()));
        if let Some(origin) = &source.origin {
            bounds.push_attribute(("origin", origin.as_str()));
        }
        writer.write_event(Event::Empty(bounds))?;
    }

    if !store.changeset_tags().is_empty() {
        writer.write_event(Event::Start(BytesStart::new("changeset")))?;
        emit_tags(store.changeset_tags(), writer)?;
        writer.write_event(Event::End(BytesEnd::new("changeset")))?;
    }

    for node in store.nodes().filter(|node| !node.meta.incomplete) {
        emit_node(node, writer)?;
    }
    for way in store.ways().filter(|way| !way.meta.incomplete) {
        emit_way(way, store, writer)?;
    }
    for relation in store.relations().filter(|relation| !relation.meta.incomplete) {
        emit_relation(relation, store, writer)?;
    }

    writer.write_event(Event::End(BytesEnd::new("osm")))?;
    Ok(())
}

fn emit_node<W: Write>(node: &Node, writer: &mut Writer<W>) -> Result<(), DecodeError> {
    let mut element = BytesStart::new("node");
    meta_attributes(&mut element, &node.meta);
    if let Some(coordinate) = node.coordinate {
        element.push_attribute(("lat", coordinate.lat.to_string().as_str()));
        element.push_attribute(("lon", coordinate.lon.to_string().as_str()));
    }

    if node.meta.tags.is_empty() {
        writer.write_event(Event::Empty(element))?;
    } else {
        writer.write_event(Event::Start(element))?;
        emit_tags(&node.meta.tags, writer)?;
        writer.write_event(Event::End(BytesEnd::new("node")))?;
    }
    Ok(())
}

fn emit_way<W: Write>(
    way: &Way,
    store: &PrimitiveStore,
    writer: &mut Writer<W>,
) -> Result<(), DecodeError> {
    let mut element = BytesStart::new("way");
    meta_attributes(&mut element, &way.meta);

    if way.nodes.is_empty() && way.meta.tags.is_empty() {
        writer.write_event(Event::Empty(element))?;
        return Ok(());
    }

    writer.write_event(Event::Start(element))?;
    for &handle in &way.nodes {
        let mut nd = BytesStart::new("nd");
        nd.push_attribute(("ref", store.primitive(handle).meta().id.to_string().as_str()));
        writer.write_event(Event::Empty(nd))?;
    }
    emit_tags(&way.meta.tags, writer)?;
    writer.write_event(Event::End(BytesEnd::new("way")))?;
    Ok(())
}

fn emit_relation<W: Write>(
    relation: &Relation,
    store: &PrimitiveStore,
    writer: &mut Writer<W>,
) -> Result<(), DecodeError> {
    let mut element = BytesStart::new("relation");
    meta_attributes(&mut element, &relation.meta);

    if relation.members.is_empty() && relation.meta.tags.is_empty() {
        writer.write_event(Event::Empty(element))?;
        return Ok(());
    }

    writer.write_event(Event::Start(element))?;
    for member in &relation.members {
        let target = store.primitive(member.handle);
        let mut entry = BytesStart::new("member");
        entry.push_attribute(("type", target.kind().to_string().as_str()));
        entry.push_attribute(("ref", target.meta().id.to_string().as_str()));
        entry.push_attribute(("role", member.role.as_str()));
        writer.write_event(Event::Empty(entry))?;
    }
    emit_tags(&relation.meta.tags, writer)?;
    writer.write_event(Event::End(BytesEnd::new("relation")))?;
    Ok(())
}

fn emit_tags<W: Write>(tags: &Tags, writer: &mut Writer<W>) -> Result<(), DecodeError> {
    for (key, value) in tags.iter() {
        let mut tag = BytesStart::new("tag");
        tag.push_attribute(("k", key.as_str()));
        tag.push_attribute(("v", value.as_str()));
        writer.write_event(Event::Empty(tag))?;
    }
    Ok(())
}

fn meta_attributes(element: &mut BytesStart, meta: &Meta) {
    element.push_attribute(("id", meta.id.to_string().as_str()));
    if meta.version != 0 {
        element.push_attribute(("version", meta.version.to_string().as_str()));
    }
    if let Some(timestamp) = meta.timestamp {
        element.push_attribute((
            "timestamp",
            timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, true)
                .as_str(),
        ));
    }
    if meta.changeset != 0 {
        element.push_attribute(("changeset", meta.changeset.to_string().as_str()));
    }
    match &meta.user {
        UserInfo::Anonymous => {}
        UserInfo::Local(name) => element.push_attribute(("user", name.as_str())),
        UserInfo::Server { uid, name } => {
            element.push_attribute(("uid", uid.to_string().as_str()));
            if let Some(name) = name {
                element.push_attribute(("user", name.as_str()));
            }
        }
    }
    if !meta.visible {
        element.push_attribute(("visible", "false"));
    }
}
