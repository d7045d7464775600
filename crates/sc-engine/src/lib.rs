//! sc-engine: The real-time render path and engine lifecycle
//!
//! Assembles the audio pipeline (streaming, poses, DBAP spatialization,
//! the control plane, and output remap) behind a cpal output stream, under
//! the three-thread contract: audio callback (wait-free), background chunk
//! loader, and control listener, communicating only through atomics.

mod config;
mod control;
mod device;
mod engine;
mod error;
mod pipeline;
mod remap;
mod render;
mod spatializer;

pub use config::{
    FOCUS_MAX, FOCUS_MIN, GAIN_MAX, GAIN_MIN, InitialParams, LiveParams, MIX_TRIM_DB,
    clamp_mix_trim,
};
pub use control::{BlockControls, ControlState, PAUSE_FADE_SECONDS, SMOOTHING_TAU_SECONDS};
pub use device::{DeviceInfo, list_output_devices};
pub use engine::{Engine, EngineConfig, SourceInput};
pub use error::{EngineError, EngineResult};
pub use pipeline::RenderPipeline;
pub use remap::{OutputRemap, RemapEntry};
pub use render::RenderBuffer;
pub use spatializer::Spatializer;
