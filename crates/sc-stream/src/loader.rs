//! Background chunk loader
//!
//! One thread fills EMPTY slots ahead of the audio thread, polling at a
//! fixed interval. The loader is the only thread that performs file I/O
//! after startup. In multichannel mode one interleaved seek+read per poll
//! cycle serves every source's inactive slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crate::slot::SlotState;
use crate::source::SourceStream;
use crate::wav::WavSource;
use crate::{StreamError, StreamResult};

/// Loader poll interval
pub const LOADER_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// The loader's file-side state; handed back at shutdown so the caller can
/// close files in the mandated order.
pub(crate) enum LoaderInput {
    /// One mono reader per stream (None for silent streams)
    Mono(Vec<Option<WavSource>>),
    /// One interleaved reader shared by all streams
    Multichannel {
        source: WavSource,
        /// Per-stream channel index into the interleaved file
        channels: Vec<Option<usize>>,
        /// De-interleave scratch, `chunk_frames × file_channels`
        scratch: Vec<f32>,
    },
}

pub(crate) struct Loader {
    streams: Vec<Arc<SourceStream>>,
    input: LoaderInput,
    running: Arc<AtomicBool>,
    /// Global playhead, read for fill prioritization
    frame_counter: Arc<AtomicU64>,
    /// Hard read failures; consumed by the monitor loop, never logged here
    read_errors: Arc<AtomicU64>,
}

impl Loader {
    pub fn new(
        streams: Vec<Arc<SourceStream>>,
        input: LoaderInput,
        running: Arc<AtomicBool>,
        frame_counter: Arc<AtomicU64>,
        read_errors: Arc<AtomicU64>,
    ) -> Self {
        Self {
            streams,
            input,
            running,
            frame_counter,
            read_errors,
        }
    }

    /// Synchronously fill chunk 0 of every stream and mark it PLAYING, so
    /// the first audio callback already has data. Runs on the caller's
    /// thread before the loader thread starts; failures here are source
    /// errors.
    pub fn prime(&mut self) -> StreamResult<()> {
        match &mut self.input {
            LoaderInput::Mono(readers) => {
                for (stream, reader) in self.streams.iter().zip(readers.iter_mut()) {
                    let Some(reader) = reader else { continue };
                    fill_mono_slot(stream, 0, 0, reader)?;
                    stream.slot(0).set_state(SlotState::Playing, Ordering::Relaxed);
                }
            }
            LoaderInput::Multichannel {
                source,
                channels,
                scratch,
            } => {
                let targets: Vec<(usize, usize)> = channels
                    .iter()
                    .enumerate()
                    .filter_map(|(i, ch)| ch.map(|c| (i, c)))
                    .collect();
                fill_interleaved(&self.streams, &targets, 0, source, scratch, true)?;
                for (i, _) in &targets {
                    self.streams[*i]
                        .slot(0)
                        .set_state(SlotState::Playing, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    /// Loader thread body. Returns the file-side state for ordered close.
    pub fn run(mut self) -> LoaderInput {
        while self.running.load(Ordering::Acquire) {
            self.fill_pass();
            thread::sleep(LOADER_POLL_INTERVAL);
        }
        self.input
    }

    /// One poll cycle: fill every EMPTY inactive slot, most urgent first.
    pub fn fill_pass(&mut self) {
        let playhead = self.frame_counter.load(Ordering::Relaxed);

        // (stream index, slot index, chunk start)
        let mut pending: Vec<(usize, usize, u64)> = self
            .streams
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.pending_fill().map(|(slot, start)| (i, slot, start)))
            .collect();
        if pending.is_empty() {
            return;
        }
        pending.sort_by_key(|&(i, _, _)| self.streams[i].frames_until_starved(playhead));

        match &mut self.input {
            LoaderInput::Mono(readers) => {
                for (i, slot_index, start) in pending {
                    let Some(reader) = readers[i].as_mut() else { continue };
                    if let Err(_e) = fill_mono_slot(&self.streams[i], slot_index, start, reader) {
                        self.read_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            LoaderInput::Multichannel {
                source,
                channels,
                scratch,
            } => {
                // One interleaved read serves every slot that wants the same
                // chunk; streams share one file, so normally there is
                // exactly one distinct start per cycle.
                let mut handled: Vec<u64> = Vec::with_capacity(2);
                for &(_, _, start) in &pending {
                    if handled.contains(&start) {
                        continue;
                    }
                    handled.push(start);

                    let targets: Vec<(usize, usize)> = pending
                        .iter()
                        .filter(|&&(_, _, s)| s == start)
                        .filter_map(|&(i, _, _)| channels[i].map(|c| (i, c)))
                        .collect();
                    if targets.is_empty() {
                        continue;
                    }
                    if fill_interleaved(&self.streams, &targets, start, source, scratch, false)
                        .is_err()
                    {
                        self.read_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }
}

/// Fill one mono slot: EMPTY → LOADING, read, publish READY (release). A
/// hard read error aborts the fill back to EMPTY.
fn fill_mono_slot(
    stream: &SourceStream,
    slot_index: usize,
    chunk_start: u64,
    reader: &mut WavSource,
) -> StreamResult<()> {
    let slot = stream.slot(slot_index);
    if !slot.begin_fill() {
        return Ok(());
    }

    let frames = stream.chunk_len_at(chunk_start) as usize;
    let buffer = slot.loader_buffer();
    match reader.read_frames_at(chunk_start, frames, &mut buffer[..frames]) {
        Ok(_) => {
            // A short read was zero-filled; the chunk still publishes whole
            slot.publish(chunk_start, frames as u64);
            Ok(())
        }
        Err(e) => {
            slot.abort_fill();
            Err(e)
        }
    }
}

/// Fill one chunk for several streams from a single interleaved read.
/// `targets` is (stream index, file channel). `prime` fills slot 0, the
/// loader path fills each stream's pending slot.
fn fill_interleaved(
    streams: &[Arc<SourceStream>],
    targets: &[(usize, usize)],
    chunk_start: u64,
    source: &mut WavSource,
    scratch: &mut [f32],
    prime: bool,
) -> StreamResult<()> {
    if targets.is_empty() {
        return Ok(());
    }
    let file_channels = source.channels();
    let frames = streams[targets[0].0].chunk_len_at(chunk_start) as usize;

    // Claim every target slot before the shared read
    // (stream index, slot index, file channel)
    let mut claimed: Vec<(usize, usize, usize)> = Vec::with_capacity(targets.len());
    for &(i, channel) in targets {
        let slot_index = if prime {
            0
        } else {
            match streams[i].pending_fill() {
                Some((slot, start)) if start == chunk_start => slot,
                _ => continue,
            }
        };
        if streams[i].slot(slot_index).begin_fill() {
            claimed.push((i, slot_index, channel));
        }
    }
    if claimed.is_empty() {
        return Ok(());
    }

    let wanted = frames * file_channels;
    if let Err(e) = source.read_frames_at(chunk_start, frames, &mut scratch[..wanted]) {
        for &(i, slot_index, _) in &claimed {
            streams[i].slot(slot_index).abort_fill();
        }
        return Err(e);
    }

    for &(i, slot_index, channel) in &claimed {
        let slot = streams[i].slot(slot_index);
        let buffer = slot.loader_buffer();
        for (frame, sample) in buffer[..frames].iter_mut().enumerate() {
            *sample = scratch[frame * file_channels + channel];
        }
        slot.publish(chunk_start, frames as u64);
    }

    Ok(())
}

/// Spawn the loader thread.
pub(crate) fn spawn_loader(loader: Loader) -> StreamResult<thread::JoinHandle<LoaderInput>> {
    thread::Builder::new()
        .name("chunk-loader".into())
        .spawn(move || loader.run())
        .map_err(|e| StreamError::SourceOpen("chunk-loader".into(), e.to_string()))
}
