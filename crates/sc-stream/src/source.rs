//! Per-source stream state shared between the audio thread and the loader

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use crate::slot::{ChunkSlot, SlotState};

/// Lock-free per-source streaming state
///
/// Two chunk slots; exactly one is PLAYING at any time. The audio thread
/// reads the PLAYING slot and performs READY → PLAYING switches; the loader
/// fills EMPTY slots. All hand-off goes through the slot state machine.
pub struct SourceStream {
    key: String,
    is_lfe: bool,
    /// Source length in frames; the playhead wraps here (cyclic playback)
    total_frames: u64,
    chunk_frames: u64,
    slots: [ChunkSlot; 2],
    /// Index of the PLAYING slot (audio thread writes, loader reads)
    active: AtomicU8,
    /// Blocks for which this source emitted silence for lack of a chunk
    underruns: AtomicU64,
    /// Source could not be mapped to an input channel; always silent
    silent: bool,
}

impl SourceStream {
    pub(crate) fn new(
        key: String,
        is_lfe: bool,
        total_frames: u64,
        chunk_frames: usize,
    ) -> Self {
        Self {
            key,
            is_lfe,
            total_frames,
            chunk_frames: chunk_frames as u64,
            slots: [ChunkSlot::new(chunk_frames), ChunkSlot::new(chunk_frames)],
            active: AtomicU8::new(0),
            underruns: AtomicU64::new(0),
            silent: false,
        }
    }

    /// A stream with no input channel; reads always produce silence.
    pub(crate) fn new_silent(key: String, is_lfe: bool) -> Self {
        let mut stream = Self::new(key, is_lfe, 1, 1);
        stream.silent = true;
        stream
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn is_lfe(&self) -> bool {
        self.is_lfe
    }

    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    #[inline]
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn slot(&self, index: usize) -> &ChunkSlot {
        &self.slots[index]
    }

    /// Map the global playhead onto the source (cyclic playback)
    #[inline]
    fn source_frame(&self, global_frame: u64) -> u64 {
        global_frame % self.total_frames
    }

    /// The chunk start that follows the given slot's chunk, wrapped to 0 at
    /// end of source.
    pub(crate) fn next_chunk_start_after(&self, slot_index: usize) -> u64 {
        let next = self.slots[slot_index].chunk_start() + self.chunk_frames;
        if next >= self.total_frames { 0 } else { next }
    }

    /// The slot the loader should fill next, with its chunk start, or None
    /// if both slots are occupied.
    ///
    /// The inactive slot is EMPTY only after a switch (or at startup), so
    /// an EMPTY slot is always a fill request for the chunk after the
    /// occupied one.
    pub(crate) fn pending_fill(&self) -> Option<(usize, u64)> {
        if self.silent {
            return None;
        }
        for index in 0..2 {
            if self.slots[index].state(Ordering::Relaxed) == SlotState::Empty {
                let other = 1 - index;
                return Some((index, self.next_chunk_start_after(other)));
            }
        }
        None
    }

    /// Frames left in the PLAYING slot from the given global playhead; the
    /// loader uses this to fill the most urgent streams first.
    pub(crate) fn frames_until_starved(&self, global_frame: u64) -> u64 {
        let src = self.source_frame(global_frame);
        let slot = &self.slots[self.active.load(Ordering::Relaxed) as usize];
        let end = slot.chunk_start() + slot.valid_frames();
        end.saturating_sub(src)
    }

    /// The length of the chunk starting at `chunk_start`, capped at end of
    /// source.
    pub(crate) fn chunk_len_at(&self, chunk_start: u64) -> u64 {
        self.chunk_frames.min(self.total_frames - chunk_start)
    }

    /// Audio-thread block read. Writes exactly `out.len()` samples; frames
    /// for which no chunk is READY come out as silence. Never blocks.
    pub fn read_block(&self, start_frame: u64, out: &mut [f32]) {
        if self.silent {
            out.fill(0.0);
            return;
        }

        let mut filled = 0;
        while filled < out.len() {
            let src = self.source_frame(start_frame + filled as u64);
            let active = self.active.load(Ordering::Relaxed) as usize;
            let slot = &self.slots[active];

            if slot.contains(src) {
                let offset = (src - slot.chunk_start()) as usize;
                let available = (slot.valid_frames() as usize) - offset;
                let take = available.min(out.len() - filled);
                slot.read_into(offset, &mut out[filled..filled + take]);
                filled += take;
            } else if self.try_switch(active, src) {
                continue;
            } else {
                // Required chunk not READY: silence for the rest of the block
                out[filled..].fill(0.0);
                self.underruns.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }

    /// Try to promote the inactive slot to PLAYING for the given source
    /// frame. The acquire load on the slot state synchronizes with the
    /// loader's release publish.
    fn try_switch(&self, active: usize, src_frame: u64) -> bool {
        let inactive = 1 - active;
        let slot = &self.slots[inactive];

        if slot.state(Ordering::Acquire) != SlotState::Ready || !slot.contains(src_frame) {
            return false;
        }

        // Release the old slot to the loader, take the new one
        self.slots[active].set_state(SlotState::Empty, Ordering::Release);
        slot.set_state(SlotState::Playing, Ordering::Relaxed);
        self.active.store(inactive as u8, Ordering::Relaxed);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fill a slot directly, standing in for the loader
    fn fill(stream: &SourceStream, slot_index: usize, chunk_start: u64, value: f32) {
        let slot = stream.slot(slot_index);
        assert!(slot.begin_fill());
        slot.loader_buffer().fill(value);
        let valid = stream.chunk_len_at(chunk_start);
        slot.publish(chunk_start, valid);
    }

    fn playing_stream(total_frames: u64, chunk_frames: usize) -> SourceStream {
        let stream = SourceStream::new("test".into(), false, total_frames, chunk_frames);
        fill(&stream, 0, 0, 1.0);
        stream
            .slot(0)
            .set_state(SlotState::Playing, Ordering::Relaxed);
        stream
    }

    #[test]
    fn reads_within_active_chunk() {
        let stream = playing_stream(1024, 256);
        let mut out = [0.0f32; 64];
        stream.read_block(0, &mut out);
        assert!(out.iter().all(|&s| s == 1.0));
        assert_eq!(stream.underruns(), 0);
    }

    #[test]
    fn switches_across_chunk_boundary() {
        let stream = playing_stream(1024, 256);
        fill(&stream, 1, 256, 2.0);

        // Block straddles the boundary at frame 256
        let mut out = [0.0f32; 64];
        stream.read_block(224, &mut out);
        assert!(out[..32].iter().all(|&s| s == 1.0));
        assert!(out[32..].iter().all(|&s| s == 2.0));

        // Old slot handed back to the loader
        assert_eq!(stream.slot(0).state(Ordering::Relaxed), SlotState::Empty);
        assert_eq!(stream.pending_fill(), Some((0, 512)));
    }

    #[test]
    fn underrun_emits_silence() {
        let stream = playing_stream(1024, 256);
        let mut out = [9.0f32; 64];
        stream.read_block(300, &mut out); // chunk 256.. not loaded
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(stream.underruns(), 1);
    }

    #[test]
    fn wraps_at_end_of_source() {
        // total not divisible by chunk: final chunk is short
        let stream = playing_stream(300, 256);
        // Final chunk [256, 300), then wrap to 0
        fill(&stream, 1, 256, 2.0);

        let mut out = [0.0f32; 64];
        // Frames 280..300 from the tail chunk, then 0.. from the head chunk
        stream.read_block(280, &mut out);
        assert!(out[..20].iter().all(|&s| s == 2.0));
        // Head chunk was switched away; refill and read again
        assert_eq!(stream.pending_fill(), Some((0, 0)));
        fill(&stream, 0, 0, 3.0);
        stream.read_block(280, &mut out);
        assert!(out[20..].iter().all(|&s| s == 3.0));
    }

    #[test]
    fn next_chunk_start_wraps_to_zero() {
        let stream = playing_stream(300, 256);
        assert_eq!(stream.next_chunk_start_after(0), 256);
        fill(&stream, 1, 256, 0.5);
        assert_eq!(stream.next_chunk_start_after(1), 0);
    }

    #[test]
    fn silent_stream_reads_zero() {
        let stream = SourceStream::new_silent("sky".into(), false);
        let mut out = [5.0f32; 32];
        stream.read_block(1_000_000, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(stream.underruns(), 0);
        assert_eq!(stream.pending_fill(), None);
    }
}
