#![doc = include_str!("../README.md")]

#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;
#[cfg_attr(feature = "mimalloc", global_allocator)]
#[cfg(feature = "mimalloc")]
static GLOBAL: MiMalloc = MiMalloc;

pub mod error;
pub mod json;
pub mod options;
pub mod pbf;
pub mod primitive;
pub mod resolve;
pub mod sink;
pub mod upload;
pub mod util;
pub mod xml;

#[doc(inline)]
pub use error::{DecodeError, StoreError, TextPosition};
#[doc(inline)]
pub use options::{CancelToken, Options};
#[doc(inline)]
pub use primitive::{
    Bounds, DataSource, DownloadPolicy, Handle, LatLon, Member, Meta, Node, Primitive,
    PrimitiveId, PrimitiveKind, PrimitiveStore, Relation, Tags, UploadPolicy, UserInfo, Way,
};
#[doc(inline)]
pub use sink::FragmentSink;

use std::fmt::{Display, Formatter};

/// The crate-level error, aggregating the per-subsystem variants.
#[derive(Debug)]
pub enum Error {
    /// A malformed or truncated payload, an unsupported format feature,
    /// a dangling local reference, an I/O fault or a cancelled parse.
    Decode(DecodeError),
    /// A consistency fault in the primitive store, such as overwriting
    /// a complete entity.
    Store(StoreError),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Decode(err) => write!(f, "decode error: {err}"),
            Error::Store(err) => write!(f, "store error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decode(err) => Some(err),
            Error::Store(err) => Some(err),
        }
    }
}

impl_err!(DecodeError, Decode);
impl_err!(StoreError, Store);
