//! Per-block control plane: atomic snapshot, exponential smoothing, and the
//! pause-fade envelope
//!
//! The audio thread owns this state. Every live atomic is loaded exactly
//! once at the top of the block; the smoothed mirror lives here and is
//! never written back to the config atomics (the smoother would chase its
//! own output through the listener thread otherwise).

use sc_pose::ElevationMode;

use crate::config::LiveParams;
use crate::render::RenderBuffer;

/// Smoothing time constant for the continuous parameters
pub const SMOOTHING_TAU_SECONDS: f32 = 0.05;

/// Pause fade length (linear ramp)
pub const PAUSE_FADE_SECONDS: f32 = 0.008;

/// The control snapshot handed to the render stage for one block
#[derive(Debug, Clone, Copy)]
pub struct BlockControls {
    pub master_gain: f32,
    pub focus: f32,
    pub speaker_mix: f32,
    pub sub_mix: f32,
    pub elevation_mode: ElevationMode,
    pub paused: bool,
}

/// Audio-thread-owned control state
pub struct ControlState {
    sample_rate: u32,
    fade_frames: u32,

    // Smoothed mirror of the continuous parameters
    master_gain: f32,
    focus: f32,
    speaker_mix: f32,
    sub_mix: f32,

    prev_paused: bool,
    prev_auto_comp: bool,

    /// Pause envelope in [0, 1]; 1 = audible
    pause_fade: f32,
    fade_step: f32,
    fade_frames_left: u32,
}

impl ControlState {
    /// Seed the smoothed mirror from the current targets so startup does
    /// not ramp.
    pub fn new(sample_rate: u32, params: &LiveParams) -> Self {
        let paused = params.paused();
        Self {
            sample_rate,
            fade_frames: ((PAUSE_FADE_SECONDS * sample_rate as f32) as u32).max(1),
            master_gain: params.master_gain(),
            focus: params.focus(),
            speaker_mix: params.speaker_mix(),
            sub_mix: params.sub_mix(),
            prev_paused: paused,
            prev_auto_comp: params.auto_comp(),
            pause_fade: if paused { 0.0 } else { 1.0 },
            fade_step: 0.0,
            fade_frames_left: 0,
        }
    }

    /// Top-of-block: snapshot every live atomic once, advance the smoothed
    /// mirror, handle pause and auto-comp edges.
    pub fn begin_block(&mut self, params: &LiveParams, num_frames: usize) -> BlockControls {
        // One relaxed load per field; nothing re-reads these within the block
        let target_gain = params.master_gain();
        let target_focus = params.focus();
        let target_speaker_mix = params.speaker_mix();
        let target_sub_mix = params.sub_mix();
        let paused = params.paused();
        let auto_comp = params.auto_comp();
        let elevation_mode = ElevationMode::from_index(params.elevation_mode());

        // Auto-comp enable edge: hand the (allocating) procedure to the
        // main thread.
        if auto_comp && !self.prev_auto_comp {
            params.request_auto_comp();
        }
        self.prev_auto_comp = auto_comp;

        // One exp per block
        let block_seconds = num_frames as f32 / self.sample_rate as f32;
        let alpha = 1.0 - (-block_seconds / SMOOTHING_TAU_SECONDS).exp();
        self.master_gain += alpha * (target_gain - self.master_gain);
        self.focus += alpha * (target_focus - self.focus);
        self.speaker_mix += alpha * (target_speaker_mix - self.speaker_mix);
        self.sub_mix += alpha * (target_sub_mix - self.sub_mix);

        // Pause edges arm the fade; the envelope advances per sample in
        // apply_pause_fade.
        if paused && !self.prev_paused {
            self.fade_step = -1.0 / self.fade_frames as f32;
            self.fade_frames_left = self.fade_frames;
        } else if !paused && self.prev_paused {
            self.fade_step = 1.0 / self.fade_frames as f32;
            self.fade_frames_left = self.fade_frames;
        }
        self.prev_paused = paused;

        BlockControls {
            master_gain: self.master_gain,
            focus: self.focus,
            speaker_mix: self.speaker_mix,
            sub_mix: self.sub_mix,
            elevation_mode,
            paused,
        }
    }

    /// The fade-out has completed and no ramp is pending: the block can be
    /// zeroed without rendering.
    #[inline]
    pub fn fully_paused(&self) -> bool {
        self.pause_fade == 0.0 && self.fade_frames_left == 0
    }

    #[inline]
    pub fn pause_fade(&self) -> f32 {
        self.pause_fade
    }

    /// Multiply every render channel by the envelope, advancing it one step
    /// per frame. Unity passthrough skips the loop entirely.
    pub fn apply_pause_fade(&mut self, render: &mut RenderBuffer, num_frames: usize) {
        if self.pause_fade == 1.0 && self.fade_frames_left == 0 {
            return;
        }

        for frame in 0..num_frames {
            let gain = self.pause_fade;
            for channel in render.as_mut_slices() {
                channel[frame] *= gain;
            }
            if self.fade_frames_left > 0 {
                self.pause_fade = (self.pause_fade + self.fade_step).clamp(0.0, 1.0);
                self.fade_frames_left -= 1;
                if self.fade_frames_left == 0 {
                    // Land exactly on the rail; float residue here would
                    // keep fully_paused() false forever
                    self.pause_fade = if self.fade_step < 0.0 { 0.0 } else { 1.0 };
                    self.fade_step = 0.0;
                }
            }
        }
    }
}
