//! Per-block pose computation
//!
//! For every source, each block: interpolate the keyframed direction at the
//! block-center time, recover from degenerate results, sanitize elevation
//! against the layout, and hand the position over in the panner's
//! coordinate space.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use sc_core::Vec3;
use sc_scene::{Scene, SpeakerLayout};

use crate::slerp::slerp;

const HALF_PI: f32 = std::f32::consts::FRAC_PI_2;
const PI: f32 = std::f32::consts::PI;

/// Interpolated directions below this magnitude are degenerate
const DEGENERATE_MAG_SQ: f32 = 1e-8;

/// How source elevation maps onto the layout's elevation range
///
/// The modes encode content provenance: Atmos-style upper-hemisphere
/// material, full-sphere material, or material that should just clip.
/// There is deliberately no auto-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ElevationMode {
    /// Remap [0, π/2] onto [el_min, el_max]
    #[default]
    RescaleAtmosUp = 0,
    /// Clamp into [el_min, el_max]
    Clamp = 1,
    /// Remap [-π/2, π/2] onto [el_min, el_max]
    RescaleFullSphere = 2,
}

impl ElevationMode {
    /// Decode the wire/CLI integer; out-of-range values fall back to the
    /// default mode.
    pub fn from_index(index: u8) -> Self {
        match index {
            1 => Self::Clamp,
            2 => Self::RescaleFullSphere,
            _ => Self::RescaleAtmosUp,
        }
    }

    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }
}

/// One source's pose for the current block
#[derive(Debug, Clone, Copy)]
pub struct Pose {
    /// Position in panner space, already scaled by the layout radius
    pub position: Vec3,
    pub is_lfe: bool,
    /// False until the first `compute_positions` call
    pub is_valid: bool,
}

impl Pose {
    const INVALID: Self = Self {
        position: Vec3::ZERO,
        is_lfe: false,
        is_valid: false,
    };
}

/// Audio-thread pose telemetry, consumed by the monitor loop
pub struct PoseStats {
    keys: Vec<String>,
    fallbacks: Vec<AtomicU64>,
    flagged: Vec<AtomicBool>,
}

impl PoseStats {
    fn new(keys: Vec<String>) -> Self {
        let count = keys.len();
        Self {
            keys,
            fallbacks: (0..count).map(|_| AtomicU64::new(0)).collect(),
            flagged: (0..count).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key(&self, index: usize) -> &str {
        &self.keys[index]
    }

    pub fn fallback_count(&self, index: usize) -> u64 {
        self.fallbacks[index].load(Ordering::Relaxed)
    }

    /// One-shot flag raised on the first fallback of a source
    pub fn is_flagged(&self, index: usize) -> bool {
        self.flagged[index].load(Ordering::Relaxed)
    }

    fn record_fallback(&self, index: usize) {
        self.fallbacks[index].fetch_add(1, Ordering::Relaxed);
        self.flagged[index].store(true, Ordering::Relaxed);
    }
}

struct SourceTrack {
    is_lfe: bool,
    times: Vec<f64>,
    /// Normalized keyframe directions (NaN survives for the fallback path)
    directions: Vec<Vec3>,
    /// Cached segment index; trajectories move forward almost always
    cursor: usize,
    last_good: Option<Vec3>,
    /// Single-keyframe fast path: final panner-space position per mode
    static_cache: Option<[Vec3; 3]>,
}

/// The pose agent: per-source keyframe tracks plus the per-block output
///
/// Owned by the audio thread after start; only `PoseStats` is shared.
pub struct PoseEngine {
    radius: f32,
    el_min: f32,
    el_max: f32,
    is_2d: bool,
    tracks: Vec<SourceTrack>,
    poses: Vec<Pose>,
    stats: Arc<PoseStats>,
}

impl PoseEngine {
    pub fn new(scene: &Scene, layout: &SpeakerLayout) -> Self {
        let mut engine = Self {
            radius: layout.radius,
            el_min: layout.el_min,
            el_max: layout.el_max,
            is_2d: layout.is_2d,
            tracks: Vec::with_capacity(scene.sources.len()),
            poses: vec![Pose::INVALID; scene.sources.len()],
            stats: Arc::new(PoseStats::new(
                scene.sources.iter().map(|s| s.key.clone()).collect(),
            )),
        };

        for source in &scene.sources {
            let times: Vec<f64> = source.keyframes.iter().map(|k| k.time).collect();
            let directions: Vec<Vec3> = source
                .keyframes
                .iter()
                .map(|k| k.direction.normalize_or_front())
                .collect();

            // Static sources skip the whole interpolation pipeline; the
            // result only depends on the live elevation mode, so cache all
            // three.
            let static_cache = match (source.is_lfe, directions.as_slice()) {
                (false, [only]) if only.is_finite() => Some([
                    engine.finalize(*only, ElevationMode::RescaleAtmosUp),
                    engine.finalize(*only, ElevationMode::Clamp),
                    engine.finalize(*only, ElevationMode::RescaleFullSphere),
                ]),
                _ => None,
            };

            engine.tracks.push(SourceTrack {
                is_lfe: source.is_lfe,
                times,
                directions,
                cursor: 0,
                last_good: None,
                static_cache,
            });
        }

        engine
    }

    /// Shared telemetry handle for the monitor loop
    pub fn stats(&self) -> Arc<PoseStats> {
        Arc::clone(&self.stats)
    }

    /// Poses for the current block, index-aligned with the scene sources
    #[inline]
    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    /// Audio-thread call: recompute every pose in place for the given
    /// block-center time.
    pub fn compute_positions(&mut self, time_sec: f64, mode: ElevationMode) {
        // Split borrows: tracks are stepped, poses rewritten
        for index in 0..self.tracks.len() {
            if self.tracks[index].is_lfe {
                self.poses[index] = Pose {
                    position: Vec3::ZERO,
                    is_lfe: true,
                    is_valid: true,
                };
                continue;
            }

            if let Some(cache) = self.tracks[index].static_cache {
                self.poses[index] = Pose {
                    position: cache[mode.index() as usize],
                    is_lfe: false,
                    is_valid: true,
                };
                continue;
            }

            let raw = self.tracks[index].interpolate(time_sec);
            let direction = if raw.is_finite() && raw.magnitude_squared() >= DEGENERATE_MAG_SQ {
                raw.normalize_or_front()
            } else {
                self.stats.record_fallback(index);
                self.tracks[index].fallback_direction(time_sec)
            };
            self.tracks[index].last_good = Some(direction);

            self.poses[index] = Pose {
                position: self.finalize(direction, mode),
                is_lfe: false,
                is_valid: true,
            };
        }
    }

    /// Elevation sanitization plus the panner-space transform
    fn finalize(&self, direction: Vec3, mode: ElevationMode) -> Vec3 {
        let sane = if self.is_2d {
            Vec3::new(direction.x, direction.y, 0.0).normalize_or_front()
        } else {
            let azimuth = direction.azimuth();
            let elevation = direction.elevation();
            let span = self.el_max - self.el_min;
            let mapped = match mode {
                ElevationMode::Clamp => elevation.clamp(self.el_min, self.el_max),
                ElevationMode::RescaleAtmosUp => {
                    let u = elevation.clamp(0.0, HALF_PI) / HALF_PI;
                    self.el_min + u * span
                }
                ElevationMode::RescaleFullSphere => {
                    let u = (elevation.clamp(-HALF_PI, HALF_PI) + HALF_PI) / PI;
                    self.el_min + u * span
                }
            };
            Vec3::from_azimuth_elevation(azimuth, mapped)
        };

        // The panner is Y-up: pre-compensating axis swap, then scale out to
        // the layout radius. Part of the sc-dbap contract.
        Vec3::new(sane.x, sane.z, -sane.y).scale(self.radius)
    }
}

impl SourceTrack {
    /// Interpolated direction at `t`, holding at the boundary keyframes
    fn interpolate(&mut self, t: f64) -> Vec3 {
        let n = self.times.len();
        if t <= self.times[0] {
            return self.directions[0];
        }
        if t >= self.times[n - 1] {
            return self.directions[n - 1];
        }

        // Walk the cached cursor; playback time moves forward nearly always
        while self.cursor + 1 < n && self.times[self.cursor + 1] <= t {
            self.cursor += 1;
        }
        while self.cursor > 0 && self.times[self.cursor] > t {
            self.cursor -= 1;
        }

        let (t0, t1) = (self.times[self.cursor], self.times[self.cursor + 1]);
        let u = (((t - t0) / (t1 - t0)).clamp(0.0, 1.0)) as f32;
        slerp(self.directions[self.cursor], self.directions[self.cursor + 1], u)
    }

    /// Degenerate recovery: last good, else the nearest finite keyframe,
    /// else front.
    fn fallback_direction(&self, t: f64) -> Vec3 {
        if let Some(good) = self.last_good {
            return good;
        }

        let nearest = self
            .times
            .iter()
            .zip(&self.directions)
            .filter(|(_, d)| d.is_finite())
            .min_by(|(ta, _), (tb, _)| {
                (t - **ta).abs().total_cmp(&(t - **tb).abs())
            })
            .map(|(_, d)| *d);

        nearest.unwrap_or(Vec3::FRONT)
    }
}
