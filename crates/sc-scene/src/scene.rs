//! Spatial scene model and JSON loading
//!
//! Scene file shape (produced by the offline preprocessor):
//!
//! ```json
//! {
//!   "sampleRate": 48000,
//!   "sources": {
//!     "11.1": [{"time": 0.0, "cart": [0.0, 1.0, 0.0]}, ...],
//!     "LFE": {"type": "lfe"}
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use sc_core::Vec3;

use crate::{SceneError, SceneResult};

/// Duplicate keyframe times within this window collapse (last wins)
const KEYFRAME_TIME_EPSILON: f64 = 1e-6;

/// One keyframe of a source trajectory
#[derive(Debug, Clone, Copy)]
pub struct Keyframe {
    /// Time in seconds from scene start
    pub time: f64,
    /// Direction from the listener (unit vector after normalization at load)
    pub direction: Vec3,
}

/// One audio source in the scene
#[derive(Debug, Clone)]
pub struct SceneSource {
    /// Source key; also names the mono file and the interleaved channel
    pub key: String,
    /// LFE sources bypass panning and sum into the subwoofers
    pub is_lfe: bool,
    /// Sorted, deduplicated keyframes; empty for LFE sources
    pub keyframes: Vec<Keyframe>,
}

/// A loaded spatial scene
///
/// Sources are held in sorted-key order; every downstream per-source array
/// (streams, poses) is index-aligned with this ordering.
#[derive(Debug, Clone)]
pub struct Scene {
    /// Engine sample rate; every source file must match it
    pub sample_rate: u32,
    pub sources: Vec<SceneSource>,
}

#[derive(Deserialize)]
struct RawScene {
    #[serde(rename = "sampleRate")]
    sample_rate: u32,
    sources: BTreeMap<String, RawSource>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSource {
    Keyframes(Vec<RawKeyframe>),
    Tagged {
        #[serde(rename = "type")]
        kind: String,
    },
}

#[derive(Deserialize)]
struct RawKeyframe {
    time: f64,
    cart: [f32; 3],
}

impl Scene {
    /// Load and normalize a scene from a JSON file
    pub fn load(path: impl AsRef<Path>) -> SceneResult<Self> {
        let file = File::open(path.as_ref())?;
        let raw: RawScene = serde_json::from_reader(BufReader::new(file))?;
        Self::from_raw(raw)
    }

    /// Parse a scene from a JSON string (used by tests)
    pub fn from_json(json: &str) -> SceneResult<Self> {
        let raw: RawScene = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawScene) -> SceneResult<Self> {
        if raw.sample_rate == 0 {
            return Err(SceneError::InvalidScene("sampleRate must be non-zero".into()));
        }

        let mut sources = Vec::with_capacity(raw.sources.len());

        // BTreeMap iteration gives the canonical sorted-key order
        for (key, raw_source) in raw.sources {
            let source = match raw_source {
                RawSource::Tagged { kind } => {
                    if !kind.eq_ignore_ascii_case("lfe") {
                        return Err(SceneError::InvalidScene(format!(
                            "source '{}': unknown type '{}'",
                            key, kind
                        )));
                    }
                    SceneSource {
                        key,
                        is_lfe: true,
                        keyframes: Vec::new(),
                    }
                }
                RawSource::Keyframes(raw_keyframes) => {
                    if raw_keyframes.is_empty() {
                        return Err(SceneError::InvalidScene(format!(
                            "source '{}': no keyframes",
                            key
                        )));
                    }
                    let keyframes = normalize_keyframes(&key, raw_keyframes);
                    SceneSource {
                        key,
                        is_lfe: false,
                        keyframes,
                    }
                }
            };
            sources.push(source);
        }

        if sources.is_empty() {
            return Err(SceneError::InvalidScene("scene has no sources".into()));
        }

        Ok(Self {
            sample_rate: raw.sample_rate,
            sources,
        })
    }

    /// Number of non-LFE sources
    pub fn object_count(&self) -> usize {
        self.sources.iter().filter(|s| !s.is_lfe).count()
    }
}

/// Sort by time, collapse near-duplicate times (last wins), replace
/// zero-magnitude directions with front.
fn normalize_keyframes(key: &str, mut raw: Vec<RawKeyframe>) -> Vec<Keyframe> {
    raw.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut keyframes: Vec<Keyframe> = Vec::with_capacity(raw.len());
    let mut replaced_zero = false;

    for rk in raw {
        let v = Vec3::new(rk.cart[0], rk.cart[1], rk.cart[2]);
        // Only zero vectors are repaired here; non-finite directions are
        // left for the per-block fallback chain to count and recover.
        let direction = if v.magnitude_squared() < 1e-12 {
            replaced_zero = true;
            Vec3::FRONT
        } else {
            v
        };

        match keyframes.last_mut() {
            Some(last) if (rk.time - last.time).abs() <= KEYFRAME_TIME_EPSILON => {
                // Duplicate time: last one wins
                last.direction = direction;
            }
            _ => keyframes.push(Keyframe {
                time: rk.time,
                direction,
            }),
        }
    }

    if replaced_zero {
        log::warn!("source '{}': zero-magnitude keyframe direction replaced with front", key);
    }

    keyframes
}
