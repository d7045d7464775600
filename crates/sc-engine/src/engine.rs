//! Engine assembly and lifecycle
//!
//! Wires streaming, poses, the spatializer, the control plane, and the
//! output device together; owns the mandatory shutdown ordering and the
//! main-thread monitor that consumes what the real-time threads can only
//! flag.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::Stream;
use cpal::traits::StreamTrait;

use sc_pose::{PoseEngine, PoseStats};
use sc_scene::{Scene, SpeakerLayout};
use sc_stream::{MultichannelMap, StreamOptions, Streaming};

use crate::config::{InitialParams, LiveParams};
use crate::control::ControlState;
use crate::device;
use crate::pipeline::RenderPipeline;
use crate::remap::OutputRemap;
use crate::spatializer::Spatializer;
use crate::{EngineError, EngineResult};

/// Where the source audio comes from
#[derive(Debug, Clone)]
pub enum SourceInput {
    /// Directory of per-source mono WAVs
    MonoDir(PathBuf),
    /// One multichannel interleaved WAV
    Multichannel(PathBuf),
}

/// Engine construction parameters (from the CLI)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Device block size in frames (power of two)
    pub buffer_size: usize,
    pub initial: InitialParams,
    /// Output device by name; None = default device
    pub device: Option<String>,
    /// Remap CSV; None = identity
    pub remap_path: Option<PathBuf>,
    /// Channel-mapping rules for multichannel mode
    pub multichannel_map: MultichannelMap,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_size: 512,
            initial: InitialParams::default(),
            device: None,
            remap_path: None,
            multichannel_map: MultichannelMap::default(),
        }
    }
}

/// Main-thread bookkeeping for the monitor loop
struct MonitorState {
    /// Per-source: degenerate-direction warning already emitted
    logged_fallback: Vec<bool>,
    underruns_seen: u64,
    read_errors_seen: u64,
}

/// The playback engine
///
/// Owns the cpal stream (and through it the audio thread's pipeline), the
/// streaming agent with its loader thread, and the shared control state.
/// Lives on the main thread.
pub struct Engine {
    stream: Option<Stream>,
    streaming: Streaming,
    params: Arc<LiveParams>,
    frame_counter: Arc<AtomicU64>,
    pose_stats: Arc<PoseStats>,
    layout: SpeakerLayout,
    monitor: MonitorState,
    sample_rate: u32,
}

impl Engine {
    /// Open the device, load the sources, and arm the audio stream.
    /// Nothing plays until `start`.
    pub fn new(
        scene: &Scene,
        layout: &SpeakerLayout,
        input: SourceInput,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let sample_rate = scene.sample_rate;

        // Device first: its channel count bounds the remap table
        let device = device::resolve_output_device(config.device.as_deref())?;
        let supported =
            device::output_stream_config(&device, sample_rate, layout.output_channels as u16)?;
        let device_channels = supported.channels() as usize;

        let remap = OutputRemap::load(
            config.remap_path.as_deref(),
            layout.output_channels,
            device_channels,
        )?;

        let frame_counter = Arc::new(AtomicU64::new(0));
        let options = StreamOptions::for_sample_rate(sample_rate);
        let streaming = match &input {
            SourceInput::MonoDir(dir) => {
                Streaming::load_scene_mono(scene, dir, Arc::clone(&frame_counter), options)?
            }
            SourceInput::Multichannel(path) => Streaming::load_scene_multichannel(
                scene,
                path,
                config.multichannel_map,
                Arc::clone(&frame_counter),
                options,
            )?,
        };

        let params = Arc::new(LiveParams::new(config.initial));
        let control = ControlState::new(sample_rate, &params);
        let spatializer = Spatializer::new(layout, config.buffer_size, params.focus());
        let poses = PoseEngine::new(scene, layout);
        let pose_stats = poses.stats();

        let pipeline = RenderPipeline::new(
            control,
            spatializer,
            poses,
            streaming.streams().to_vec(),
            remap,
            Arc::clone(&params),
            Arc::clone(&frame_counter),
            sample_rate,
        );

        let stream =
            device::build_output_stream(&device, &supported, config.buffer_size, pipeline)?;

        log::info!(
            "engine ready: {} sources, {} render channels, {} device channels @ {} Hz / {} frames",
            scene.sources.len(),
            layout.output_channels,
            device_channels,
            sample_rate,
            config.buffer_size
        );

        Ok(Self {
            stream: Some(stream),
            streaming,
            params: Arc::clone(&params),
            frame_counter,
            pose_stats: Arc::clone(&pose_stats),
            layout: layout.clone(),
            monitor: MonitorState {
                logged_fallback: vec![false; pose_stats.len()],
                underruns_seen: 0,
                read_errors_seen: 0,
            },
            sample_rate,
        })
    }

    /// Start the audio callback
    pub fn start(&mut self) -> EngineResult<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| EngineError::Stream("stream already stopped".into()))?;
        stream
            .play()
            .map_err(|e| EngineError::Stream(e.to_string()))
    }

    /// Shared live-parameter handle for the control listener
    pub fn params(&self) -> Arc<LiveParams> {
        Arc::clone(&self.params)
    }

    /// Playback position in seconds
    pub fn position_seconds(&self) -> f64 {
        self.frame_counter.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    /// Main-thread monitor tick: run pending auto-compensation, surface
    /// what the audio and loader threads could only count or flag.
    pub fn poll(&mut self) {
        if self.params.take_auto_comp_request() {
            let focus = self.params.focus();
            let mix = Spatializer::compute_focus_compensation(&self.layout, focus);
            self.params.set_speaker_mix(mix);
            log::info!(
                "focus auto-compensation: focus {:.2} -> speaker mix {:.3}",
                focus,
                mix
            );
        }

        for index in 0..self.pose_stats.len() {
            if self.pose_stats.is_flagged(index) && !self.monitor.logged_fallback[index] {
                self.monitor.logged_fallback[index] = true;
                log::warn!(
                    "source '{}': degenerate direction, using fallback ({} so far)",
                    self.pose_stats.key(index),
                    self.pose_stats.fallback_count(index)
                );
            }
        }

        let underruns: u64 = self
            .streaming
            .streams()
            .iter()
            .map(|s| s.underruns())
            .sum();
        if underruns > self.monitor.underruns_seen {
            log::debug!(
                "stream underruns: +{} (total {})",
                underruns - self.monitor.underruns_seen,
                underruns
            );
            self.monitor.underruns_seen = underruns;
        }

        let read_errors = self.streaming.read_errors();
        if read_errors > self.monitor.read_errors_seen {
            log::warn!(
                "loader read errors: +{} (total {})",
                read_errors - self.monitor.read_errors_seen,
                read_errors
            );
            self.monitor.read_errors_seen = read_errors;
        }
    }

    /// Shutdown step 1: stop the device stream; the callback will not run
    /// again after this returns.
    pub fn stop_audio(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
        }
    }

    /// Shutdown step 2: stop and join the loader thread
    pub fn stop_loader(&mut self) {
        self.streaming.stop_loader();
    }

    /// Shutdown step 4: close the source files (the control listener stops
    /// between steps 2 and 4, outside the engine)
    pub fn close_files(&mut self) {
        self.streaming.close_files();
    }

    /// Full teardown in order, for callers without a control listener
    pub fn shutdown(&mut self) {
        self.stop_audio();
        self.stop_loader();
        self.close_files();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
