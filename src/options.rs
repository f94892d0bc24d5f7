//! Per-parse configuration passed explicitly to every decoder.
//!
//! There is deliberately no process-wide state: whatever invokes the
//! decoders owns an [`Options`] value and hands it down. The one knob it
//! carries today is cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::DecodeError;

/// A shared flag raised by the caller to abandon an in-flight parse.
///
/// Decoders poll the token between top-level frames and elements and
/// unwind with [`DecodeError::Cancelled`] without committing anything.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Safe to call from any thread, any number of times.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Decoder configuration. `Default` yields a parse that cannot be
/// cancelled externally.
#[derive(Debug, Clone, Default)]
pub struct Options {
    cancel: CancelToken,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Couples these options to an externally held cancellation token.
    pub fn with_cancel(cancel: CancelToken) -> Self {
        Options { cancel }
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn check(&self) -> Result<(), DecodeError> {
        if self.cancelled() {
            return Err(DecodeError::Cancelled);
        }
        Ok(())
    }
}
