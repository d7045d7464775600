//! WAV source reading via hound
//!
//! Sources are decoded to f32 at read time. Supported encodings: 16/24/32
//! bit integer PCM and 32-bit float.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec};

use crate::{StreamError, StreamResult};

/// An open WAV source file
pub(crate) struct WavSource {
    reader: WavReader<BufReader<File>>,
    spec: WavSpec,
    /// Frames per channel
    total_frames: u64,
    /// Path retained for error reporting
    path: String,
}

impl WavSource {
    pub fn open(path: &Path) -> StreamResult<Self> {
        let display = path.display().to_string();
        let reader = WavReader::open(path)
            .map_err(|e| StreamError::SourceOpen(display.clone(), e.to_string()))?;
        let spec = reader.spec();
        let total_frames = reader.duration() as u64;

        if total_frames == 0 {
            return Err(StreamError::FormatMismatch(display, "file is empty".into()));
        }

        match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32)
            | (SampleFormat::Int, 16)
            | (SampleFormat::Int, 24)
            | (SampleFormat::Int, 32) => {}
            (format, bits) => {
                return Err(StreamError::UnsupportedFormat(
                    display,
                    format!("{:?} {}-bit", format, bits),
                ));
            }
        }

        Ok(Self {
            reader,
            spec,
            total_frames,
            path: display,
        })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.spec.channels as usize
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read up to `frames` frames starting at `start_frame`, interleaved,
    /// into `out` (`frames × channels` samples). The tail beyond what the
    /// file holds is zero-filled. Returns the frame count actually read.
    ///
    /// A decode error is a hard error; the caller leaves the slot EMPTY.
    pub fn read_frames_at(
        &mut self,
        start_frame: u64,
        frames: usize,
        out: &mut [f32],
    ) -> StreamResult<usize> {
        let channels = self.channels();
        debug_assert!(out.len() >= frames * channels);

        self.reader
            .seek(start_frame.min(u32::MAX as u64) as u32)
            .map_err(|e| StreamError::Read(self.path.clone(), e.to_string()))?;

        let wanted = frames * channels;
        let read = match (self.spec.sample_format, self.spec.bits_per_sample) {
            (SampleFormat::Float, 32) => {
                decode_into(self.reader.samples::<f32>(), &mut out[..wanted], |s| s)
            }
            (SampleFormat::Int, 16) => {
                decode_into(self.reader.samples::<i16>(), &mut out[..wanted], |s| {
                    s as f32 / 32768.0
                })
            }
            (SampleFormat::Int, 24) => {
                decode_into(self.reader.samples::<i32>(), &mut out[..wanted], |s| {
                    s as f32 / 8_388_608.0
                })
            }
            (SampleFormat::Int, 32) => {
                decode_into(self.reader.samples::<i32>(), &mut out[..wanted], |s| {
                    s as f32 / 2_147_483_648.0
                })
            }
            _ => unreachable!("format validated at open"),
        };
        let samples_read = read.map_err(|e| StreamError::Read(self.path.clone(), e))?;

        // Zero-fill a short read (end of file)
        out[samples_read..wanted].fill(0.0);

        Ok(samples_read / channels)
    }
}

fn decode_into<S, I, F>(samples: I, out: &mut [f32], convert: F) -> Result<usize, String>
where
    I: Iterator<Item = hound::Result<S>>,
    F: Fn(S) -> f32,
{
    let mut count = 0;
    for (slot, sample) in out.iter_mut().zip(samples) {
        match sample {
            Ok(s) => {
                *slot = convert(s);
                count += 1;
            }
            Err(e) => return Err(e.to_string()),
        }
    }
    Ok(count)
}
