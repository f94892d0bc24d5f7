//! The length-prefixed blob framing layer.
//!
//! A PBF stream is a sequence of frames: a 4-byte big-endian length,
//! the `BlobHeader` it sizes, then a `Blob` of the header's declared
//! size. The frame reader inflates each blob's payload before handing
//! it on, so the block layer only ever sees plain protobuf bytes.

use std::io::Read;

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use log::trace;
use prost::Message;

use crate::error::DecodeError;

use super::proto::{blob::Data, Blob, BlobHeader};

/// Hard limit for a `BlobHeader`; larger values mean a corrupted
/// stream, not a big file.
const MAX_BLOBHEADER_SIZE: usize = 64 * 1024;
/// Hard limit for a `Blob`.
const MAX_BLOB_SIZE: usize = 32 * 1024 * 1024;

const FRAME_LEN_SIZE: usize = 4;

/// One decoded frame: the blob type tag and its inflated payload.
pub(crate) struct Frame {
    pub kind: String,
    pub data: Bytes,
}

/// Iterates frames off a byte stream in the order they appear.
pub(crate) struct FrameReader<R> {
    read: R,
    index: u64,
}

impl<R: Read> FrameReader<R> {
    pub fn new(read: R) -> FrameReader<R> {
        FrameReader { read, index: 0 }
    }

    /// Reads the 4-byte frame length, distinguishing clean end-of-stream
    /// from a mid-prefix truncation.
    fn read_frame_len(&mut self) -> Result<Option<usize>, DecodeError> {
        let mut buffer = [0_u8; FRAME_LEN_SIZE];
        let mut filled = 0;
        while filled < FRAME_LEN_SIZE {
            let n = self.read.read(&mut buffer[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(DecodeError::malformed(
                    "stream ends inside a blob header length prefix",
                ));
            }
            filled += n;
        }

        let length = i32::from_be_bytes(buffer);
        if length < 0 {
            return Err(DecodeError::malformed(format!(
                "negative blob header length {length}"
            )));
        }
        Ok(Some(length as usize))
    }

    fn read_exact(&mut self, len: usize, what: &str) -> Result<Vec<u8>, DecodeError> {
        let mut buffer = vec![0_u8; len];
        self.read.read_exact(&mut buffer).map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                DecodeError::malformed(format!("stream ends inside {what}"))
            } else {
                DecodeError::Io(err)
            }
        })?;
        Ok(buffer)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        let Some(header_len) = self.read_frame_len()? else {
            return Ok(None);
        };
        if header_len > MAX_BLOBHEADER_SIZE {
            return Err(DecodeError::malformed(format!(
                "blob header of {header_len} bytes exceeds the {MAX_BLOBHEADER_SIZE} byte limit, probably corrupted"
            )));
        }

        let header_bytes = self.read_exact(header_len, "a blob header")?;
        let header = BlobHeader::decode(header_bytes.as_slice())?;

        let datasize = header.datasize;
        if datasize < 0 || datasize as usize > MAX_BLOB_SIZE {
            return Err(DecodeError::malformed(format!(
                "blob of {datasize} bytes exceeds the {MAX_BLOB_SIZE} byte limit, probably corrupted"
            )));
        }

        let blob_bytes = self.read_exact(datasize as usize, "a blob")?;
        let blob = Blob::decode(blob_bytes.as_slice())?;

        trace!(
            "frame {}: {} blob, {} bytes on the wire",
            self.index,
            header.r#type,
            datasize
        );
        self.index += 1;

        Ok(Some(Frame {
            kind: header.r#type,
            data: inflate(blob)?,
        }))
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Frame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

/// Recovers the raw payload bytes, inflating zlib where needed. The
/// remaining codecs the format names are recognised but not decoded.
fn inflate(blob: Blob) -> Result<Bytes, DecodeError> {
    let raw_size = blob.raw_size.unwrap_or(0).max(0) as usize;
    match blob.data {
        Some(Data::Raw(data)) => Ok(Bytes::from(data)),
        Some(Data::ZlibData(data)) => {
            let mut decoder = ZlibDecoder::new(data.as_slice());
            let mut decoded = Vec::with_capacity(raw_size);
            decoder.read_to_end(&mut decoded).map_err(|err| {
                DecodeError::malformed(format!("zlib inflate failed: {err}"))
            })?;
            Ok(Bytes::from(decoded))
        }
        Some(Data::LzmaData(_)) => Err(DecodeError::UnsupportedCompression("lzma")),
        Some(Data::ObsoleteBzip2Data(_)) => Err(DecodeError::UnsupportedCompression("bzip2")),
        Some(Data::Lz4Data(_)) => Err(DecodeError::UnsupportedCompression("lz4")),
        Some(Data::ZstdData(_)) => Err(DecodeError::UnsupportedCompression("zstd")),
        None => Err(DecodeError::malformed("blob carries no payload")),
    }
}
