//! The binary PBF decoder.
//!
//! A PBF file is a sequence of length-prefixed frames, each a
//! `BlobHeader` plus its `Blob`. Exactly one `OSMHeader` blob must
//! appear before any `OSMData` blob; every `OSMData` blob is a
//! `PrimitiveBlock` committed to the fragment tables in stream order,
//! since later blocks may reference entities from earlier ones.

pub mod proto;

pub(crate) mod blob;
pub(crate) mod block;


use std::io::Read;

use log::warn;
use prost::Message;

use crate::error::DecodeError;
use crate::options::Options;
use crate::primitive::PrimitiveStore;
use crate::resolve::resolve;
use crate::sink::{FragmentSink, Fragments};
use crate::Error;

use blob::FrameReader;

/// Parses an OSM-PBF byte stream into a resolved primitive store.
pub fn parse<R: Read>(read: R, options: &Options) -> Result<PrimitiveStore, Error> {
    let mut fragments = Fragments::new();
    decode(read, options, &mut fragments)?;
    resolve(fragments, options)
}

/// Walks the frame sequence, committing each block to the sink.
fn decode<R: Read>(
    read: R,
    options: &Options,
    sink: &mut impl FragmentSink,
) -> Result<(), DecodeError> {
    let mut header_seen = false;

    for frame in FrameReader::new(read) {
        options.check()?;
        let frame = frame?;

        match frame.kind.as_str() {
            "OSMHeader" => {
                let header = proto::HeaderBlock::decode(frame.data)?;
                block::commit_header(header, sink)?;
                header_seen = true;
            }
            "OSMData" => {
                if !header_seen {
                    return Err(DecodeError::malformed(
                        "OSMData blob appears before the OSMHeader",
                    ));
                }
                let primitives = proto::PrimitiveBlock::decode(frame.data)?;
                block::commit_block(primitives, sink)?;
            }
            other => warn!("skipping unrecognised blob type '{other}'"),
        }
    }
    Ok(())
}
