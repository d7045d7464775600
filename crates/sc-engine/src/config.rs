//! Live control state shared between the control listener and the audio
//! thread
//!
//! Every live parameter is a single atomic; floats are stored as their bit
//! pattern in an `AtomicU32`. The control listener thread is the exclusive
//! writer of the value fields, the audio thread snapshots them once per
//! block. Smoothed values are never written back here.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use sc_core::db_to_linear;

/// Master gain range (per-source pre-pan multiplier)
pub const GAIN_MIN: f32 = 0.1;
pub const GAIN_MAX: f32 = 3.0;

/// DBAP focus exponent range
pub const FOCUS_MIN: f32 = 0.2;
pub const FOCUS_MAX: f32 = 5.0;

/// Post-mix trim range in dB (speaker and subwoofer mixes)
pub const MIX_TRIM_DB: f32 = 10.0;

/// Clamp a post-mix trim to the ±10 dB linear window
#[inline]
pub fn clamp_mix_trim(linear: f32) -> f32 {
    linear.clamp(db_to_linear(-MIX_TRIM_DB), db_to_linear(MIX_TRIM_DB))
}

/// Initial values for the live parameters, from the CLI
#[derive(Debug, Clone, Copy)]
pub struct InitialParams {
    pub master_gain: f32,
    pub focus: f32,
    /// Linear speaker trim
    pub speaker_mix: f32,
    /// Linear subwoofer trim
    pub sub_mix: f32,
    pub auto_comp: bool,
    pub elevation_mode: u8,
}

impl Default for InitialParams {
    fn default() -> Self {
        Self {
            master_gain: 0.5,
            focus: 1.5,
            speaker_mix: 1.0,
            sub_mix: 1.0,
            auto_comp: false,
            elevation_mode: 0,
        }
    }
}

/// The shared live-parameter block
///
/// Writers: the control listener thread (value fields) and the main thread
/// (auto-compensation result). Reader: the audio thread, one relaxed load
/// per field per block.
pub struct LiveParams {
    master_gain: AtomicU32,
    focus: AtomicU32,
    speaker_mix: AtomicU32,
    sub_mix: AtomicU32,
    auto_comp: AtomicBool,
    paused: AtomicBool,
    elevation_mode: AtomicU8,
    /// Set by the audio thread on an auto-comp enable edge and by the
    /// control listener on focus changes while enabled; consumed by the
    /// main monitor loop.
    pending_auto_comp: AtomicBool,
}

impl LiveParams {
    pub fn new(initial: InitialParams) -> Self {
        Self {
            master_gain: AtomicU32::new(
                initial.master_gain.clamp(GAIN_MIN, GAIN_MAX).to_bits(),
            ),
            focus: AtomicU32::new(initial.focus.clamp(FOCUS_MIN, FOCUS_MAX).to_bits()),
            speaker_mix: AtomicU32::new(clamp_mix_trim(initial.speaker_mix).to_bits()),
            sub_mix: AtomicU32::new(clamp_mix_trim(initial.sub_mix).to_bits()),
            auto_comp: AtomicBool::new(initial.auto_comp),
            paused: AtomicBool::new(false),
            elevation_mode: AtomicU8::new(initial.elevation_mode.min(2)),
            pending_auto_comp: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn master_gain(&self) -> f32 {
        f32::from_bits(self.master_gain.load(Ordering::Relaxed))
    }

    pub fn set_master_gain(&self, value: f32) {
        self.master_gain
            .store(value.clamp(GAIN_MIN, GAIN_MAX).to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn focus(&self) -> f32 {
        f32::from_bits(self.focus.load(Ordering::Relaxed))
    }

    pub fn set_focus(&self, value: f32) {
        self.focus
            .store(value.clamp(FOCUS_MIN, FOCUS_MAX).to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn speaker_mix(&self) -> f32 {
        f32::from_bits(self.speaker_mix.load(Ordering::Relaxed))
    }

    pub fn set_speaker_mix(&self, linear: f32) {
        self.speaker_mix
            .store(clamp_mix_trim(linear).to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn sub_mix(&self) -> f32 {
        f32::from_bits(self.sub_mix.load(Ordering::Relaxed))
    }

    pub fn set_sub_mix(&self, linear: f32) {
        self.sub_mix
            .store(clamp_mix_trim(linear).to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn auto_comp(&self) -> bool {
        self.auto_comp.load(Ordering::Relaxed)
    }

    pub fn set_auto_comp(&self, enabled: bool) {
        self.auto_comp.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    #[inline]
    pub fn elevation_mode(&self) -> u8 {
        self.elevation_mode.load(Ordering::Relaxed)
    }

    pub fn set_elevation_mode(&self, mode: u8) {
        self.elevation_mode.store(mode.min(2), Ordering::Relaxed);
    }

    /// Ask the main thread to run focus auto-compensation
    pub fn request_auto_comp(&self) {
        self.pending_auto_comp.store(true, Ordering::Release);
    }

    /// Main-thread consume of the pending request
    pub fn take_auto_comp_request(&self) -> bool {
        self.pending_auto_comp.swap(false, Ordering::Acquire)
    }
}

impl Default for LiveParams {
    fn default() -> Self {
        Self::new(InitialParams::default())
    }
}
