//! sc-dbap: Distance-Based Amplitude Panning
//!
//! Weights speakers by their distance from a virtual source position; the
//! focus exponent controls how sharply energy concentrates on the nearest
//! speakers. Gains are normalized to constant power, and a small spatial
//! blur keeps the law finite when the source position coincides with a
//! speaker.
//!
//! Coordinate convention: Y-up, right-handed. +x right, +y up, +z back.
//! Callers working in a z-up listening space hand positions over as
//! `(x, z, -y)`.
//!
//! Gain law, per speaker `i` with distance `d_i` to the source:
//!
//! ```text
//! d_i = sqrt(|p - s_i|^2 + blur^2)
//! w_i = d_i^-focus
//! g_i = w_i / sqrt(sum(w_j^2))
//! ```

use sc_core::{Sample, Vec3};

/// Keeps distances bounded away from zero (meters)
pub const SPATIAL_BLUR: f32 = 0.1;

/// Speaker gains below this are skipped in the accumulate loop
const GAIN_FLOOR: f32 = 1e-6;

/// A distance-based amplitude panner over a fixed speaker set
///
/// Speaker order defines the render-channel order: speaker `i` accumulates
/// into channel `i`. Gain storage is preallocated; `compute_gains` and
/// `pan` never allocate.
pub struct DbapPanner {
    speakers: Vec<Vec3>,
    focus: f32,
    blur: f32,
    gains: Vec<f32>,
}

impl DbapPanner {
    /// Build a panner over the given speaker positions (panner space)
    pub fn new(speakers: Vec<Vec3>, focus: f32) -> Self {
        let count = speakers.len();
        Self {
            speakers,
            focus: focus.max(0.0),
            blur: SPATIAL_BLUR,
            gains: vec![0.0; count],
        }
    }

    #[inline]
    pub fn speaker_count(&self) -> usize {
        self.speakers.len()
    }

    #[inline]
    pub fn focus(&self) -> f32 {
        self.focus
    }

    /// Set the focus exponent. Refreshed every block by the render path.
    #[inline]
    pub fn set_focus(&mut self, focus: f32) {
        self.focus = focus.max(0.0);
    }

    /// Compute constant-power gains for a source position
    pub fn compute_gains(&mut self, position: Vec3) -> &[f32] {
        let mut power = 0.0f32;
        for (gain, speaker) in self.gains.iter_mut().zip(&self.speakers) {
            let distance_sq = position.sub(speaker).magnitude_squared() + self.blur * self.blur;
            let distance = distance_sq.sqrt();
            let weight = distance.powf(-self.focus);
            *gain = weight;
            power += weight * weight;
        }

        if power > 1e-20 {
            let scale = 1.0 / power.sqrt();
            for gain in &mut self.gains {
                *gain *= scale;
            }
        } else {
            self.gains.fill(0.0);
        }

        &self.gains
    }

    /// Pan a mono block into the render channels (accumulating).
    /// `render[i]` is speaker `i`'s channel; only the first `input.len()`
    /// frames of each channel are touched.
    pub fn pan(&mut self, position: Vec3, input: &[Sample], render: &mut [Vec<Sample>]) {
        debug_assert!(render.len() >= self.speakers.len());
        self.compute_gains(position);

        for (gain, channel) in self.gains.iter().zip(render.iter_mut()) {
            let g = *gain;
            if g < GAIN_FLOOR {
                continue;
            }
            for (out, sample) in channel[..input.len()].iter_mut().zip(input) {
                *out += sample * g;
            }
        }
    }

    /// Sum of gains at a position, the loudness proxy used by focus
    /// auto-compensation.
    pub fn gain_sum(&mut self, position: Vec3) -> f32 {
        self.compute_gains(position).iter().sum()
    }
}
