//! Audio device enumeration and output stream construction

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{
    BufferSize as CpalBufferSize, Device, Host, SampleFormat, Stream, StreamConfig,
    SupportedStreamConfig,
};

use crate::pipeline::RenderPipeline;
use crate::{EngineError, EngineResult};

/// Audio device information for `--list-devices`
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub output_channels: u16,
}

/// Get the audio host (platform default backend)
pub fn get_host() -> Host {
    cpal::default_host()
}

/// List available output devices
pub fn list_output_devices() -> EngineResult<Vec<DeviceInfo>> {
    let host = get_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    for device in host
        .output_devices()
        .map_err(|e| EngineError::DeviceConfig(e.to_string()))?
    {
        if let Ok(name) = device.name() {
            let output_channels = device
                .supported_output_configs()
                .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
                .unwrap_or(0);
            let is_default = default_name.as_deref() == Some(name.as_str());
            devices.push(DeviceInfo {
                name,
                is_default,
                output_channels,
            });
        }
    }
    Ok(devices)
}

/// Resolve the output device: by name if given, the default otherwise
pub fn resolve_output_device(name: Option<&str>) -> EngineResult<Device> {
    let host = get_host();
    match name {
        None => host.default_output_device().ok_or(EngineError::NoDevice),
        Some(wanted) => {
            for device in host
                .output_devices()
                .map_err(|e| EngineError::DeviceConfig(e.to_string()))?
            {
                if device.name().is_ok_and(|n| n == wanted) {
                    return Ok(device);
                }
            }
            Err(EngineError::DeviceNotFound(wanted.to_string()))
        }
    }
}

/// Find a supported f32 output configuration with at least `min_channels`
/// at the given sample rate, preferring the lowest channel count that fits.
pub fn output_stream_config(
    device: &Device,
    sample_rate: u32,
    min_channels: u16,
) -> EngineResult<SupportedStreamConfig> {
    let rate: cpal::SampleRate = sample_rate;

    let configs = device
        .supported_output_configs()
        .map_err(|e| EngineError::DeviceConfig(e.to_string()))?;

    let mut best: Option<cpal::SupportedStreamConfigRange> = None;
    for supported in configs {
        if supported.sample_format() != SampleFormat::F32
            || supported.channels() < min_channels
            || supported.min_sample_rate() > rate
            || supported.max_sample_rate() < rate
        {
            continue;
        }
        let better = match &best {
            None => true,
            Some(current) => supported.channels() < current.channels(),
        };
        if better {
            best = Some(supported);
        }
    }

    best.map(|range| range.with_sample_rate(rate)).ok_or_else(|| {
        EngineError::DeviceConfig(format!(
            "no f32 output config with >= {} channels @ {} Hz",
            min_channels, sample_rate
        ))
    })
}

/// Build the output stream around the render pipeline. The pipeline moves
/// into the callback closure; the audio thread owns it from here on.
pub fn build_output_stream(
    device: &Device,
    supported: &SupportedStreamConfig,
    buffer_size: usize,
    mut pipeline: RenderPipeline,
) -> EngineResult<Stream> {
    let channels = supported.channels() as usize;
    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size as u32),
    };

    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                pipeline.process(data, channels);
            },
            move |err| {
                log::error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| EngineError::StreamBuild(e.to_string()))
}
