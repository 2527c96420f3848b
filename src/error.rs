//! Error types shared by the whole crate.
//!
//! Lookup misses (MAC table, computation cache) are deliberately not errors;
//! those operations return `Option` instead. NaN is an accepted "unknown"
//! value in numeric parameters and propagates silently.

use thiserror::Error;

/// Errors produced by the simulator core.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed static configuration (bad matrices, degenerate shapes,
    /// unknown mode strings). Fatal at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Runtime input that cannot be processed (e.g. a codeword whose
    /// depunctured length is not a multiple of n).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation was applied to something it never handles (the medium
    /// only responds to its own self-timers).
    #[error("not applicable: {0}")]
    NotApplicable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
