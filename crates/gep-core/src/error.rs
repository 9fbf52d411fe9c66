//! Error types for GEP wire handling

use thiserror::Error;

/// Result type alias for GEP core operations
pub type Result<T> = std::result::Result<T, Error>;

/// GEP wire-level error types
#[derive(Error, Debug)]
pub enum Error {
    /// A field read ran past the end of the buffer
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// A source string in the signal index cache was not valid UTF-8
    #[error("invalid UTF-8 in source string")]
    InvalidSource(#[from] std::string::FromUtf8Error),

    /// GZip decompression of a payload failed
    #[error("decompress error: {0}")]
    Decompress(String),

    /// A TSSC packet carried an unknown version byte
    #[error("TSSC version not recognized: 0x{0:02x}")]
    TsscVersion(u8),

    /// The TSSC code-word stream violated the decoder's state machine
    #[error("TSSC decode error: {0}")]
    Tssc(String),
}
