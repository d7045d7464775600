//! Per-block spatial rendering: DBAP for object sources, direct summing
//! for LFE sources, and the post-mix trims

use std::sync::Arc;

use sc_core::{Sample, Vec3, db_to_linear};
use sc_dbap::DbapPanner;
use sc_pose::Pose;
use sc_scene::SpeakerLayout;
use sc_stream::SourceStream;

use crate::control::BlockControls;
use crate::render::RenderBuffer;

/// LFE level spread across the subwoofers (headroom below clipping)
const LFE_SUM_LEVEL: f32 = 0.95;

/// Reference loudness position for focus auto-compensation: front, on the
/// layout radius, in panner space.
fn reference_position(layout: &SpeakerLayout) -> Vec3 {
    Vec3::new(0.0, 0.0, -layout.radius)
}

/// Speaker positions in the panner's Y-up space, render-channel order
fn panner_speakers(layout: &SpeakerLayout) -> Vec<Vec3> {
    layout
        .speakers
        .iter()
        .map(|s| {
            let p = Vec3::from_azimuth_elevation(s.azimuth, s.elevation).scale(s.radius);
            Vec3::new(p.x, p.z, -p.y)
        })
        .collect()
}

/// The render stage: owns the DBAP panner and the render buffer
///
/// Speakers render at channels `0..speaker_count`, subwoofers at their
/// device-channel indices. Everything here is preallocated; `render_block`
/// never allocates.
pub struct Spatializer {
    panner: DbapPanner,
    speaker_count: usize,
    sub_channels: Vec<usize>,
    output_channels: usize,
    render: RenderBuffer,
    /// Per-source premultiplied mono block
    scratch: Vec<Sample>,
    /// 0.95 spread across the subwoofers
    lfe_gain: f32,
}

impl Spatializer {
    pub fn new(layout: &SpeakerLayout, buffer_size: usize, initial_focus: f32) -> Self {
        let sub_count = layout.subwoofers.len();
        Self {
            panner: DbapPanner::new(panner_speakers(layout), initial_focus),
            speaker_count: layout.speaker_count(),
            sub_channels: layout.subwoofers.clone(),
            output_channels: layout.output_channels,
            render: RenderBuffer::new(layout.output_channels, buffer_size),
            scratch: vec![0.0; buffer_size],
            lfe_gain: if sub_count > 0 {
                LFE_SUM_LEVEL / sub_count as f32
            } else {
                0.0
            },
        }
    }

    #[inline]
    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    #[inline]
    pub fn render(&self) -> &RenderBuffer {
        &self.render
    }

    #[inline]
    pub fn render_mut(&mut self) -> &mut RenderBuffer {
        &mut self.render
    }

    /// Render one block into the internal buffer.
    ///
    /// `streams` and `poses` are index-aligned (canonical scene order);
    /// `frame` is the global playhead at block start.
    pub fn render_block(
        &mut self,
        streams: &[Arc<SourceStream>],
        poses: &[Pose],
        frame: u64,
        num_frames: usize,
        ctrl: &BlockControls,
    ) {
        // The focus is live; bake it into the panner every block
        self.panner.set_focus(ctrl.focus);

        self.render.zero(num_frames);

        for (stream, pose) in streams.iter().zip(poses) {
            if !pose.is_valid {
                continue;
            }

            stream.read_block(frame, &mut self.scratch[..num_frames]);
            if ctrl.master_gain != 1.0 {
                for sample in &mut self.scratch[..num_frames] {
                    *sample *= ctrl.master_gain;
                }
            }

            if pose.is_lfe {
                // Straight into the subwoofers; no panning for LFE content
                for &channel in &self.sub_channels {
                    let out = self.render.channel_mut(channel);
                    for (out, sample) in out[..num_frames].iter_mut().zip(&self.scratch) {
                        *out += sample * self.lfe_gain;
                    }
                }
            } else {
                self.panner.pan(
                    pose.position,
                    &self.scratch[..num_frames],
                    self.render.as_mut_slices(),
                );
            }
        }

        self.apply_mix_trims(num_frames, ctrl);
    }

    /// Post-mix trims with unity guards
    fn apply_mix_trims(&mut self, num_frames: usize, ctrl: &BlockControls) {
        if ctrl.speaker_mix != 1.0 {
            for channel in 0..self.output_channels {
                if self.sub_channels.contains(&channel) {
                    continue;
                }
                for sample in &mut self.render.channel_mut(channel)[..num_frames] {
                    *sample *= ctrl.speaker_mix;
                }
            }
        }
        if ctrl.sub_mix != 1.0 {
            for &channel in &self.sub_channels {
                for sample in &mut self.render.channel_mut(channel)[..num_frames] {
                    *sample *= ctrl.sub_mix;
                }
            }
        }
    }

    /// Focus auto-compensation: the speaker trim that restores the loudness
    /// a unit impulse at the reference position had at focus 0.
    ///
    /// Main-thread only; allocates a throwaway panner rather than touching
    /// the audio thread's.
    pub fn compute_focus_compensation(layout: &SpeakerLayout, focus: f32) -> f32 {
        let mut panner = DbapPanner::new(panner_speakers(layout), focus);
        let reference = reference_position(layout);

        let g = panner.gain_sum(reference);
        panner.set_focus(0.0);
        let g0 = panner.gain_sum(reference);

        if g <= 1e-10 {
            return 1.0;
        }
        (g0 / g).clamp(db_to_linear(-10.0), db_to_linear(10.0))
    }
}
