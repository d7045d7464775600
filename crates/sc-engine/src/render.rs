//! The audio-thread render buffer

use sc_core::Sample;

/// Fixed `channels × frames` scratch matrix owned by the audio thread
///
/// The DBAP mix, LFE routing, trims, and the pause fade are assembled here
/// before the remap stage copies it to the device buffer. Allocated once;
/// nothing in the block path resizes it.
pub struct RenderBuffer {
    channels: Vec<Vec<Sample>>,
    frames: usize,
}

impl RenderBuffer {
    pub fn new(channel_count: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channel_count],
            frames,
        }
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Zero the first `num_frames` of every channel
    pub fn zero(&mut self, num_frames: usize) {
        for channel in &mut self.channels {
            channel[..num_frames].fill(0.0);
        }
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.channels[index]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        &mut self.channels[index]
    }

    /// Channel-major view for the panner's accumulate loop
    #[inline]
    pub fn as_mut_slices(&mut self) -> &mut [Vec<Sample>] {
        &mut self.channels
    }
}
