//! Error types for the pexref crate.
//!
//! Format and I/O layers keep their own error enums; this type wraps them
//! for callers that go from a path on disk to a disassembler in one step.

use thiserror::Error;

use crate::formats::pe::PeError;
use crate::io::error::IoError;

/// Main error type for pexref operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The image was rejected by the PE parser
    #[error("Invalid PE image: {0}")]
    Pe(#[from] PeError),

    /// Loading the image failed
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Options could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// No supported executable type matched
    #[error("Unsupported executable format")]
    UnsupportedFormat,
}

/// Result type alias for pexref operations
pub type Result<T> = std::result::Result<T, Error>;
