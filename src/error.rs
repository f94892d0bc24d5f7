//! Decode and store error definitions, shared by every format decoder.
//!
//! The taxonomy distinguishes faults that abort a parse (malformed input,
//! unsupported features, dangling local references) from real-world data
//! skew, which never surfaces here: references to deleted or missing
//! server entities degrade into placeholders inside the resolution
//! engine and are logged instead.

use std::fmt::{Display, Formatter};
use std::io;

use crate::primitive::PrimitiveId;

/// A 1-based line/column pair locating a fault inside a textual payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPosition {
    pub line: u64,
    pub column: u64,
}

impl Display for TextPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

/// A fatal decoding fault. Constructing one of these aborts the current
/// parse; no partially-linked graph is ever handed to the caller.
#[derive(Debug)]
pub enum DecodeError {
    /// Structurally invalid input: a missing mandatory attribute, an
    /// unparsable literal, a length mismatch between parallel arrays.
    Malformed {
        message: String,
        position: Option<TextPosition>,
    },
    /// The payload declares a required feature this decoder does not
    /// implement.
    UnsupportedFeature(String),
    /// The blob is compressed with a codec the decoder recognises but
    /// cannot inflate.
    UnsupportedCompression(&'static str),
    /// A negative (client-local) id was referenced but never defined in
    /// the payload. Local ids must always resolve, so this indicates a
    /// corrupted or incomplete dataset.
    DanglingLocalReference {
        parent: PrimitiveId,
        reference: PrimitiveId,
    },
    /// The cancellation token was raised between frames or elements.
    Cancelled,
    /// The underlying transport failed; propagated unchanged.
    Io(io::Error),
}

impl DecodeError {
    /// A [`DecodeError::Malformed`] without source location.
    pub fn malformed(message: impl Into<String>) -> Self {
        DecodeError::Malformed {
            message: message.into(),
            position: None,
        }
    }

    /// Attaches a source location to a malformed-input error. Other
    /// variants pass through untouched.
    pub fn at(self, position: TextPosition) -> Self {
        match self {
            DecodeError::Malformed { message, .. } => DecodeError::Malformed {
                message,
                position: Some(position),
            },
            other => other,
        }
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Malformed {
                message,
                position: Some(position),
            } => write!(f, "{message} ({position})"),
            DecodeError::Malformed { message, .. } => write!(f, "{message}"),
            DecodeError::UnsupportedFeature(feature) => {
                write!(f, "unknown required feature '{feature}'")
            }
            DecodeError::UnsupportedCompression(codec) => {
                write!(f, "unsupported blob compression '{codec}'")
            }
            DecodeError::DanglingLocalReference { parent, reference } => write!(
                f,
                "{parent} refers to missing local {reference}; negative ids must be defined in the payload"
            ),
            DecodeError::Cancelled => write!(f, "parse cancelled"),
            DecodeError::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(value: io::Error) -> Self {
        DecodeError::Io(value)
    }
}

impl From<prost::DecodeError> for DecodeError {
    fn from(value: prost::DecodeError) -> Self {
        DecodeError::malformed(value.to_string())
    }
}

impl From<quick_xml::Error> for DecodeError {
    fn from(value: quick_xml::Error) -> Self {
        match value {
            quick_xml::Error::Io(err) => {
                DecodeError::Io(std::sync::Arc::try_unwrap(err).unwrap_or_else(|arc| {
                    io::Error::new(arc.kind(), arc.to_string())
                }))
            }
            other => DecodeError::malformed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(value: serde_json::Error) -> Self {
        let position = (value.line() != 0).then(|| TextPosition {
            line: value.line() as u64,
            column: value.column() as u64,
        });
        DecodeError::Malformed {
            message: value.to_string(),
            position,
        }
    }
}

/// A consistency fault inside the primitive store. These indicate a
/// caller error, never normal data skew, and are reported rather than
/// swallowed.
#[derive(Debug)]
pub enum StoreError {
    /// An insert attempted to overwrite a complete entity.
    Occupied(PrimitiveId),
    /// An identity rewrite would collide with an entity already keyed
    /// under the target id.
    RewriteCollision {
        from: PrimitiveId,
        to: PrimitiveId,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Occupied(id) => {
                write!(f, "store already holds a complete {id}")
            }
            StoreError::RewriteCollision { from, to } => {
                write!(f, "rewriting {from} to {to} collides with an existing entity")
            }
        }
    }
}

impl std::error::Error for StoreError {}
