//! The audio callback body
//!
//! One `process` call renders one device block: control snapshot, poses,
//! spatial mix, pause fade, output remap, frame-counter advance. Everything
//! it touches is preallocated or atomic: no heap allocation, no locks, no
//! I/O on this path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sc_core::Sample;
use sc_pose::PoseEngine;
use sc_stream::SourceStream;

use crate::config::LiveParams;
use crate::control::ControlState;
use crate::remap::OutputRemap;
use crate::spatializer::Spatializer;

/// Everything the audio thread owns, assembled before the stream starts
pub struct RenderPipeline {
    control: ControlState,
    spatializer: Spatializer,
    poses: PoseEngine,
    streams: Vec<Arc<SourceStream>>,
    remap: OutputRemap,
    params: Arc<LiveParams>,
    /// Global playhead; the loader reads it for fill prioritization
    frame_counter: Arc<AtomicU64>,
    sample_rate: u32,
}

impl RenderPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        control: ControlState,
        spatializer: Spatializer,
        poses: PoseEngine,
        streams: Vec<Arc<SourceStream>>,
        remap: OutputRemap,
        params: Arc<LiveParams>,
        frame_counter: Arc<AtomicU64>,
        sample_rate: u32,
    ) -> Self {
        Self {
            control,
            spatializer,
            poses,
            streams,
            remap,
            params,
            frame_counter,
            sample_rate,
        }
    }

    #[inline]
    pub fn output_channels(&self) -> usize {
        self.spatializer.output_channels()
    }

    /// Current playhead in frames
    pub fn position(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    /// Render one block into the interleaved device buffer.
    pub fn process(&mut self, out: &mut [Sample], device_channels: usize) {
        let num_frames = out.len() / device_channels;
        if num_frames == 0 {
            return;
        }

        let ctrl = self.control.begin_block(&self.params, num_frames);

        // Fade-out finished earlier: hold position, emit silence
        if ctrl.paused && self.control.fully_paused() {
            out[..num_frames * device_channels].fill(0.0);
            return;
        }

        let frame = self.frame_counter.load(Ordering::Relaxed);
        let block_center =
            (frame as f64 + num_frames as f64 * 0.5) / self.sample_rate as f64;

        self.poses.compute_positions(block_center, ctrl.elevation_mode);
        self.spatializer.render_block(
            &self.streams,
            self.poses.poses(),
            frame,
            num_frames,
            &ctrl,
        );
        self.control
            .apply_pause_fade(self.spatializer.render_mut(), num_frames);
        self.remap
            .apply(self.spatializer.render(), out, num_frames, device_channels);

        // The position freezes the moment the fade-out lands on zero
        let ends_silent = ctrl.paused && self.control.pause_fade() == 0.0;
        if !ends_silent {
            self.frame_counter
                .store(frame + num_frames as u64, Ordering::Relaxed);
        }
    }
}
