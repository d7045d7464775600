//! Scene/layout error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),
}

pub type SceneResult<T> = Result<T, SceneError>;
