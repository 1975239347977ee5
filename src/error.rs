//! Error types for biometal-cram

use thiserror::Error;

/// Result type alias for biometal-cram operations
pub type Result<T> = std::result::Result<T, BiometalError>;

/// Error types that can occur while reading or writing CRAM
#[derive(Debug, Error)]
pub enum BiometalError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CRAM stream (bad magic, truncation, inconsistent tables)
    #[error("Invalid CRAM format: {msg}")]
    InvalidCramFormat {
        /// Error message
        msg: String,
    },

    /// Stored CRC32 does not match the bytes it covers
    #[error("CRC32 mismatch in {what}: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        /// Structure whose checksum failed (block, container header)
        what: String,
        /// CRC32 stored in the stream
        expected: u32,
        /// CRC32 computed over the bytes read
        actual: u32,
    },

    /// A data series or tag needed an encoding the compression header lacks
    #[error("No encoding for {key} in compression header")]
    MissingEncoding {
        /// Data series key or tag name
        key: String,
    },

    /// Read feature operator byte not defined by CRAM 3.0
    #[error("Unknown read feature operator: {operator:#04x} ('{}')", *.operator as char)]
    UnknownReadFeature {
        /// Operator byte as found in the FC data series
        operator: u8,
    },

    /// Invalid encoding strategy or API misuse
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),
}

impl BiometalError {
    /// Shorthand for [`BiometalError::InvalidCramFormat`]
    pub(crate) fn cram(msg: impl Into<String>) -> Self {
        BiometalError::InvalidCramFormat { msg: msg.into() }
    }
}
