//! Streaming error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to open source '{0}': {1}")]
    SourceOpen(String, String),

    #[error("Source '{0}' format mismatch: {1}")]
    FormatMismatch(String, String),

    #[error("Unsupported sample format in '{0}': {1}")]
    UnsupportedFormat(String, String),

    #[error("Read error in '{0}': {1}")]
    Read(String, String),
}

pub type StreamResult<T> = Result<T, StreamError>;
