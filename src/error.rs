use thiserror::Error;

/// Errors produced by the encoder and decoder.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad magic, unsupported version, truncated header/payload, or an
    /// unexpected frame count.
    #[error("invalid container: {0}")]
    InvalidContainer(String),
    /// An operation that this implementation does not support, such as
    /// seeking to a non-zero frame index.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// Bad caller input: wrong bitmap depth, mismatched dimensions, a
    /// non-positive fps, or dimensions outside 1..32767.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Underlying read/write failure.
    #[error("I/O failure: {0}")]
    IOFailure(#[from] std::io::Error),
    /// A condition that should be structurally impossible if the stream is
    /// well-formed, such as an RLE run overrunning a macroblock.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

/// A specialised `Result` type for encode/decode operations.
pub type Result<T> = ::std::result::Result<T, Error>;
