//! Engine error types

use thiserror::Error;

use sc_stream::StreamError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No audio device found")]
    NoDevice,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device config: {0}")]
    DeviceConfig(String),

    #[error("Failed to build stream: {0}")]
    StreamBuild(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Remap error: {0}")]
    Remap(String),

    #[error(transparent)]
    Source(#[from] StreamError),
}

pub type EngineResult<T> = Result<T, EngineError>;
