//! Error types for the heap engine.

use thiserror::Error;

/// Heap engine errors.
///
/// These abort the analysis of the current call; diagnostics that let the
/// call proceed are [`Alarm`](crate::Alarm) values instead.
#[derive(Debug, Error)]
pub enum HeapError {
    #[error("builtin {builtin} expects {expected} argument(s), got {got}")]
    InvalidArgCount {
        builtin: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid realloc: {0}")]
    InvalidRealloc(String),

    #[error("realloc from weak base {base} is not yet implemented")]
    WeakReallocUnsupported { base: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("unknown builtin: {0}")]
    UnknownBuiltin(String),
}

/// Result type for heap engine operations.
pub type HeapResult<T> = Result<T, HeapError>;
