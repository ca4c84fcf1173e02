//! Error types for the nrtscore-dsp crate.

use thiserror::Error;

/// Errors that can occur during SynthDef construction, encoding and decoding.
#[derive(Error, Debug)]
pub enum SynthDefError {
    /// A parameter was referenced by name but doesn't exist.
    #[error("Unknown parameter: {0}")]
    UnknownParam(String),

    /// A parameter was declared twice.
    #[error("Duplicate parameter: {0}")]
    DuplicateParam(String),

    /// Parameters were declared after the first UGen was added.
    #[error("Parameter '{0}' declared after UGens were added")]
    LateParam(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error during binary encoding.
    #[error("Encoding error: {0}")]
    EncodingError(String),

    /// Error while reading a compiled SynthDef.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Graph validation failed.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Result type alias using SynthDefError.
pub type Result<T> = std::result::Result<T, SynthDefError>;
