//! Crate-wide error type for trace reading.
//!
//! End-of-stream is never an error: readers return `Ok(None)` when a trace is
//! exhausted, including when a flat trace ends in a truncated record (logs
//! still being appended routinely end mid-record).

/// Errors that can occur while opening or reading a trace
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// I/O error from the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Summary or metadata JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File is not a recognized trace container
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A declared length exceeds the bytes actually present mid-stream, or a
    /// chunk checksum does not match
    #[error("Corrupt trace data: {0}")]
    Corruption(String),

    /// Requested global index is beyond the end of the trace
    #[error("Record index {0} is out of range")]
    IndexOutOfRange(usize),

    /// Operation is only meaningful for the other container strategy
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// No decoder registered for an encountered encoding/schema pair
    #[error("No decoder found for encoding '{encoding}', schema '{schema}'")]
    DecoderNotFound {
        /// Message encoding of the channel that could not be decoded
        encoding: String,
        /// Schema name, or an empty string when the channel carries none
        schema: String,
    },
}
