//! sc-scene: Scene and speaker-layout data model
//!
//! Parses the scene JSON produced by the offline preprocessor and the
//! speaker layout JSON, and derives the layout parameters the render path
//! needs (layout radius, elevation bounds, channel count).

mod error;
mod layout;
mod scene;

pub use error::*;
pub use layout::*;
pub use scene::*;
