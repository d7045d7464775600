//! sc-stream: Lock-free per-source audio streaming
//!
//! Feeds per-source mono blocks to the audio thread from bounded memory:
//! - Two chunk buffers per source, handed between the loader and the audio
//!   thread through an atomic state machine
//! - Background loader thread, one poll every ~2 ms
//! - Mono mode (one WAV per source) and multichannel mode (one interleaved
//!   WAV, a single shared read per poll cycle)
//! - The audio thread never blocks: a missing chunk comes out as silence
//!
//! Playback is cyclic; the global playhead wraps at each source's length.

mod error;
mod loader;
mod map;
mod slot;
mod source;
mod wav;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use sc_scene::Scene;

use crate::loader::{Loader, LoaderInput, spawn_loader};
use crate::wav::WavSource;

pub use error::{StreamError, StreamResult};
pub use loader::LOADER_POLL_INTERVAL;
pub use map::MultichannelMap;
pub use slot::SlotState;
pub use source::SourceStream;

/// Chunk length in seconds of audio per slot
pub const CHUNK_SECONDS: u64 = 5;

/// Helpers for downstream crates' unit tests: streams preloaded without a
/// file or loader thread behind them.
#[doc(hidden)]
pub mod test_support {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use crate::slot::SlotState;
    use crate::source::SourceStream;

    /// A looping stream whose single chunk holds the given samples
    pub fn preloaded_stream(key: &str, is_lfe: bool, samples: &[f32]) -> Arc<SourceStream> {
        let stream = SourceStream::new(key.into(), is_lfe, samples.len() as u64, samples.len());
        let slot = stream.slot(0);
        assert!(slot.begin_fill());
        slot.loader_buffer()[..samples.len()].copy_from_slice(samples);
        slot.publish(0, samples.len() as u64);
        slot.set_state(SlotState::Playing, Ordering::Relaxed);
        Arc::new(stream)
    }

    /// A looping stream holding a constant value
    pub fn constant_stream(value: f32, is_lfe: bool) -> Arc<SourceStream> {
        preloaded_stream("test", is_lfe, &vec![value; 4096])
    }
}

/// Streaming tunables
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Frames per chunk slot (two slots per source)
    pub chunk_frames: usize,
}

impl StreamOptions {
    /// The standard chunk size for a session at the given sample rate
    pub fn for_sample_rate(sample_rate: u32) -> Self {
        Self {
            chunk_frames: (CHUNK_SECONDS * sample_rate as u64) as usize,
        }
    }
}

/// The streaming agent: per-source streams plus the loader thread
///
/// Built once at scene load; the stream list is immutable afterwards and is
/// index-aligned with the scene's source order.
pub struct Streaming {
    streams: Vec<Arc<SourceStream>>,
    running: Arc<AtomicBool>,
    loader_thread: Option<JoinHandle<LoaderInput>>,
    /// File-side state recovered from the joined loader, pending close
    inputs: Option<LoaderInput>,
    read_errors: Arc<AtomicU64>,
}

impl Streaming {
    /// Open one mono WAV per source (`<sources_dir>/<key>.wav`), prime the
    /// first chunk of each, and start the loader thread.
    pub fn load_scene_mono(
        scene: &Scene,
        sources_dir: &Path,
        frame_counter: Arc<AtomicU64>,
        options: StreamOptions,
    ) -> StreamResult<Self> {
        let mut streams = Vec::with_capacity(scene.sources.len());
        let mut readers = Vec::with_capacity(scene.sources.len());

        for source in &scene.sources {
            let path = sources_dir.join(format!("{}.wav", source.key));
            let reader = WavSource::open(&path)?;
            if reader.channels() != 1 {
                return Err(StreamError::FormatMismatch(
                    reader.path().to_string(),
                    format!("expected mono, found {} channels", reader.channels()),
                ));
            }
            if reader.sample_rate() != scene.sample_rate {
                return Err(StreamError::FormatMismatch(
                    reader.path().to_string(),
                    format!(
                        "sample rate {} does not match engine rate {}",
                        reader.sample_rate(),
                        scene.sample_rate
                    ),
                ));
            }

            streams.push(Arc::new(SourceStream::new(
                source.key.clone(),
                source.is_lfe,
                reader.total_frames(),
                options.chunk_frames,
            )));
            readers.push(Some(reader));
        }

        Self::start(streams, LoaderInput::Mono(readers), frame_counter)
    }

    /// Open a single multichannel interleaved WAV, map every source key to
    /// a file channel, prime the first chunk, and start the loader thread
    /// in multichannel mode.
    ///
    /// Sources whose key maps to no channel (or to one past the end of the
    /// file) are logged once and stream silence.
    pub fn load_scene_multichannel(
        scene: &Scene,
        adm_path: &Path,
        map: MultichannelMap,
        frame_counter: Arc<AtomicU64>,
        options: StreamOptions,
    ) -> StreamResult<Self> {
        let source_file = WavSource::open(adm_path)?;
        if source_file.sample_rate() != scene.sample_rate {
            return Err(StreamError::FormatMismatch(
                source_file.path().to_string(),
                format!(
                    "sample rate {} does not match engine rate {}",
                    source_file.sample_rate(),
                    scene.sample_rate
                ),
            ));
        }

        let file_channels = source_file.channels();
        let total_frames = source_file.total_frames();

        let mut streams = Vec::with_capacity(scene.sources.len());
        let mut channels = Vec::with_capacity(scene.sources.len());

        for source in &scene.sources {
            match map.channel_for(&source.key, source.is_lfe) {
                Some(channel) if channel < file_channels => {
                    streams.push(Arc::new(SourceStream::new(
                        source.key.clone(),
                        source.is_lfe,
                        total_frames,
                        options.chunk_frames,
                    )));
                    channels.push(Some(channel));
                }
                Some(channel) => {
                    log::warn!(
                        "source '{}' maps to channel {} but the file has {} channels; skipping",
                        source.key,
                        channel,
                        file_channels
                    );
                    streams.push(Arc::new(SourceStream::new_silent(
                        source.key.clone(),
                        source.is_lfe,
                    )));
                    channels.push(None);
                }
                None => {
                    log::warn!(
                        "source '{}' has no channel mapping; skipping",
                        source.key
                    );
                    streams.push(Arc::new(SourceStream::new_silent(
                        source.key.clone(),
                        source.is_lfe,
                    )));
                    channels.push(None);
                }
            }
        }

        let scratch = vec![0.0f32; options.chunk_frames * file_channels];
        let input = LoaderInput::Multichannel {
            source: source_file,
            channels,
            scratch,
        };
        Self::start(streams, input, frame_counter)
    }

    fn start(
        streams: Vec<Arc<SourceStream>>,
        input: LoaderInput,
        frame_counter: Arc<AtomicU64>,
    ) -> StreamResult<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let read_errors = Arc::new(AtomicU64::new(0));

        let mut loader = Loader::new(
            streams.clone(),
            input,
            Arc::clone(&running),
            frame_counter,
            Arc::clone(&read_errors),
        );
        loader.prime()?;
        let loader_thread = spawn_loader(loader)?;

        Ok(Self {
            streams,
            running,
            loader_thread: Some(loader_thread),
            inputs: None,
            read_errors,
        })
    }

    /// Per-source streams, index-aligned with the scene's source order
    #[inline]
    pub fn streams(&self) -> &[Arc<SourceStream>] {
        &self.streams
    }

    /// Hard loader read failures so far
    pub fn read_errors(&self) -> u64 {
        self.read_errors.load(Ordering::Relaxed)
    }

    /// Signal the loader to exit and join it. Precondition: the audio
    /// thread has stopped. File handles stay open until `close_files`.
    pub fn stop_loader(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.loader_thread.take() {
            match handle.join() {
                Ok(input) => self.inputs = Some(input),
                Err(_) => log::error!("chunk-loader thread panicked"),
            }
        }
    }

    /// Close the source file handles (after the loader has been joined).
    pub fn close_files(&mut self) {
        self.inputs = None;
    }

    /// Stop the loader and close files. Precondition: the audio thread has
    /// stopped.
    pub fn shutdown(&mut self) {
        self.stop_loader();
        self.close_files();
    }
}

impl Drop for Streaming {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_mono_wav(dir: &Path, name: &str, samples: &[f32], sample_rate: u32) -> PathBuf {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let path = dir.join(format!("{}.wav", name));
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn write_interleaved_wav(
        dir: &Path,
        name: &str,
        channels: usize,
        frames: usize,
        sample_rate: u32,
        value_for: impl Fn(usize, usize) -> f32,
    ) -> PathBuf {
        let spec = hound::WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let path = dir.join(format!("{}.wav", name));
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for frame in 0..frames {
            for channel in 0..channels {
                writer.write_sample(value_for(frame, channel)).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    fn scene_json(sources: &[(&str, bool)]) -> Scene {
        let body: Vec<String> = sources
            .iter()
            .map(|(key, lfe)| {
                if *lfe {
                    format!(r#""{}": {{"type": "lfe"}}"#, key)
                } else {
                    format!(r#""{}": [{{"time": 0.0, "cart": [0.0, 1.0, 0.0]}}]"#, key)
                }
            })
            .collect();
        Scene::from_json(&format!(
            r#"{{"sampleRate": 48000, "sources": {{{}}}}}"#,
            body.join(",")
        ))
        .unwrap()
    }

    fn small_options() -> StreamOptions {
        StreamOptions { chunk_frames: 64 }
    }

    #[test]
    fn mono_mode_primes_first_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let scene = scene_json(&[("a", false)]);
        write_mono_wav(dir.path(), "a", &vec![0.25f32; 256], 48000);

        let counter = Arc::new(AtomicU64::new(0));
        let mut streaming =
            Streaming::load_scene_mono(&scene, dir.path(), counter, small_options()).unwrap();

        let mut out = [0.0f32; 32];
        streaming.streams()[0].read_block(0, &mut out);
        assert!(out.iter().all(|&s| s == 0.25));

        streaming.shutdown();
    }

    #[test]
    fn loader_keeps_chunks_ahead_of_playhead() {
        let dir = tempfile::tempdir().unwrap();
        let scene = scene_json(&[("a", false)]);
        let samples: Vec<f32> = (0..512).map(|i| i as f32 / 512.0).collect();
        write_mono_wav(dir.path(), "a", &samples, 48000);

        let counter = Arc::new(AtomicU64::new(0));
        let mut streaming =
            Streaming::load_scene_mono(&scene, dir.path(), Arc::clone(&counter), small_options())
                .unwrap();
        let stream = Arc::clone(&streaming.streams()[0]);

        // Walk several chunk boundaries, giving the loader time to refill
        let mut out = [0.0f32; 32];
        let mut frame = 0u64;
        for _ in 0..32 {
            stream.read_block(frame, &mut out);
            frame += out.len() as u64;
            counter.store(frame, Ordering::Relaxed);
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        assert_eq!(stream.underruns(), 0, "loader fell behind");
        // 1024 frames into a 512-frame source: wrapped, reading the ramp
        stream.read_block(frame, &mut out);
        let expected = (frame % 512) as f32 / 512.0;
        assert!((out[0] - expected).abs() < 1e-6);

        streaming.shutdown();
    }

    #[test]
    fn mono_mode_rejects_stereo_and_wrong_rate() {
        let dir = tempfile::tempdir().unwrap();
        let scene = scene_json(&[("a", false)]);

        write_interleaved_wav(dir.path(), "a", 2, 64, 48000, |_, _| 0.0);
        let counter = Arc::new(AtomicU64::new(0));
        assert!(matches!(
            Streaming::load_scene_mono(&scene, dir.path(), counter, small_options()),
            Err(StreamError::FormatMismatch(_, _))
        ));

        write_mono_wav(dir.path(), "a", &[0.0; 64], 44100);
        let counter = Arc::new(AtomicU64::new(0));
        assert!(matches!(
            Streaming::load_scene_mono(&scene, dir.path(), counter, small_options()),
            Err(StreamError::FormatMismatch(_, _))
        ));
    }

    #[test]
    fn missing_source_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let scene = scene_json(&[("a", false)]);
        let counter = Arc::new(AtomicU64::new(0));
        assert!(matches!(
            Streaming::load_scene_mono(&scene, dir.path(), counter, small_options()),
            Err(StreamError::SourceOpen(_, _))
        ));
    }

    #[test]
    fn multichannel_mode_deinterleaves_mapped_channels() {
        let dir = tempfile::tempdir().unwrap();
        // Keys "11.1" -> channel 10, "LFE" -> channel 3
        let scene = scene_json(&[("11.1", false), ("LFE", true)]);
        let adm = write_interleaved_wav(dir.path(), "adm", 48, 128, 48000, |_, channel| {
            channel as f32 / 100.0
        });

        let counter = Arc::new(AtomicU64::new(0));
        let mut streaming = Streaming::load_scene_multichannel(
            &scene,
            &adm,
            MultichannelMap::default(),
            counter,
            small_options(),
        )
        .unwrap();

        // Scene order is sorted: "11.1" before "LFE"
        let mut out = [0.0f32; 16];
        streaming.streams()[0].read_block(0, &mut out);
        assert!(out.iter().all(|&s| (s - 0.10).abs() < 1e-6));

        streaming.streams()[1].read_block(0, &mut out);
        assert!(out.iter().all(|&s| (s - 0.03).abs() < 1e-6));

        streaming.shutdown();
    }

    #[test]
    fn unmapped_sources_stream_silence() {
        let dir = tempfile::tempdir().unwrap();
        let scene = scene_json(&[("narration", false)]);
        let adm = write_interleaved_wav(dir.path(), "adm", 4, 64, 48000, |_, _| 0.5);

        let counter = Arc::new(AtomicU64::new(0));
        let mut streaming = Streaming::load_scene_multichannel(
            &scene,
            &adm,
            MultichannelMap::default(),
            counter,
            small_options(),
        )
        .unwrap();

        let mut out = [1.0f32; 16];
        streaming.streams()[0].read_block(0, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        streaming.shutdown();
    }
}
