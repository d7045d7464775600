//! Output remap: render channels onto device channels
//!
//! A CSV file with case-insensitive headers `layout,device` (both 0-based)
//! describes an accumulating map from render-channel indices to device
//! output channels. Multiple layout rows may target one device channel and
//! sum there. An absent file, or a table that covers exactly
//! `[0, render_channels)` one-to-one, takes the identity fast path.
//!
//! The table is parsed once on the main thread and immutable afterwards.

use std::path::Path;

use sc_core::Sample;

use crate::render::RenderBuffer;
use crate::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemapEntry {
    pub layout_channel: usize,
    pub device_channel: usize,
}

/// The immutable remap table
pub struct OutputRemap {
    entries: Vec<RemapEntry>,
    identity: bool,
    render_channels: usize,
}

impl OutputRemap {
    /// The identity map over `render_channels` channels
    pub fn identity(render_channels: usize) -> Self {
        Self {
            entries: Vec::new(),
            identity: true,
            render_channels,
        }
    }

    /// Parse a remap CSV. `path = None` and a missing file both yield the
    /// identity map; malformed syntax is an error; out-of-range rows are
    /// dropped with a one-time log.
    pub fn load(
        path: Option<&Path>,
        render_channels: usize,
        device_channels: usize,
    ) -> EngineResult<Self> {
        let Some(path) = path else {
            return Ok(Self::identity(render_channels));
        };
        if !path.exists() {
            return Ok(Self::identity(render_channels));
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Remap(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text, render_channels, device_channels)
            .map_err(|e| EngineError::Remap(format!("{}: {}", path.display(), e)))
    }

    fn parse(
        text: &str,
        render_channels: usize,
        device_channels: usize,
    ) -> Result<Self, String> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));

        let header = lines.next().ok_or("missing header row")?;
        let columns: Vec<String> = header
            .split(',')
            .map(|c| c.trim().to_ascii_lowercase())
            .collect();
        let layout_column = columns
            .iter()
            .position(|c| c == "layout")
            .ok_or("header has no 'layout' column")?;
        let device_column = columns
            .iter()
            .position(|c| c == "device")
            .ok_or("header has no 'device' column")?;

        let mut entries = Vec::new();
        let mut dropped = 0usize;

        for (number, line) in lines.enumerate() {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let field = |column: usize| -> Result<usize, String> {
                fields
                    .get(column)
                    .ok_or_else(|| format!("row {}: missing column", number + 1))?
                    .parse::<usize>()
                    .map_err(|_| format!("row {}: not an integer: '{}'", number + 1, line))
            };
            let entry = RemapEntry {
                layout_channel: field(layout_column)?,
                device_channel: field(device_column)?,
            };

            if entry.layout_channel >= render_channels || entry.device_channel >= device_channels
            {
                dropped += 1;
                continue;
            }
            entries.push(entry);
        }

        if dropped > 0 {
            log::warn!(
                "remap: dropped {} out-of-range row(s) (render channels {}, device channels {})",
                dropped,
                render_channels,
                device_channels
            );
        }

        let identity = Self::is_identity_table(&entries, render_channels);
        Ok(Self {
            entries,
            identity,
            render_channels,
        })
    }

    /// True iff the table maps `c -> c` for every render channel, exactly
    /// once each, and nothing else.
    fn is_identity_table(entries: &[RemapEntry], render_channels: usize) -> bool {
        if entries.len() != render_channels {
            return false;
        }
        let mut seen = vec![false; render_channels];
        for entry in entries {
            if entry.layout_channel != entry.device_channel {
                return false;
            }
            if seen[entry.layout_channel] {
                return false; // duplicate
            }
            seen[entry.layout_channel] = true;
        }
        seen.into_iter().all(|covered| covered)
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    #[inline]
    pub fn entries(&self) -> &[RemapEntry] {
        &self.entries
    }

    /// Audio-thread copy of the render buffer into the interleaved device
    /// buffer. The device buffer is fully zeroed first, so unmapped device
    /// channels always carry silence.
    pub fn apply(
        &self,
        render: &RenderBuffer,
        out: &mut [Sample],
        num_frames: usize,
        device_channels: usize,
    ) {
        out[..num_frames * device_channels].fill(0.0);

        if self.identity {
            let channels = self.render_channels.min(device_channels);
            for channel in 0..channels {
                let samples = render.channel(channel);
                for frame in 0..num_frames {
                    out[frame * device_channels + channel] = samples[frame];
                }
            }
            return;
        }

        for entry in &self.entries {
            if entry.device_channel >= device_channels {
                continue;
            }
            let samples = render.channel(entry.layout_channel);
            for frame in 0..num_frames {
                out[frame * device_channels + entry.device_channel] += samples[frame];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_with(values: &[f32], frames: usize) -> RenderBuffer {
        let mut render = RenderBuffer::new(values.len(), frames);
        for (channel, &value) in values.iter().enumerate() {
            render.channel_mut(channel).fill(value);
        }
        render
    }

    #[test]
    fn missing_path_is_identity() {
        let remap = OutputRemap::load(None, 4, 4).unwrap();
        assert!(remap.is_identity());

        let remap = OutputRemap::load(Some(Path::new("/nonexistent/remap.csv")), 4, 4).unwrap();
        assert!(remap.is_identity());
    }

    #[test]
    fn identity_table_is_detected() {
        let remap = OutputRemap::parse("layout,device\n0,0\n1,1\n2,2\n", 3, 8).unwrap();
        assert!(remap.is_identity());

        // Permutation is not identity
        let remap = OutputRemap::parse("layout,device\n0,1\n1,0\n2,2\n", 3, 8).unwrap();
        assert!(!remap.is_identity());

        // Incomplete cover is not identity
        let remap = OutputRemap::parse("layout,device\n0,0\n1,1\n", 3, 8).unwrap();
        assert!(!remap.is_identity());

        // Duplicates are not identity
        let remap = OutputRemap::parse("layout,device\n0,0\n0,0\n1,1\n", 3, 8).unwrap();
        assert!(!remap.is_identity());
    }

    #[test]
    fn comments_empty_lines_and_extra_columns_are_tolerated() {
        let remap = OutputRemap::parse(
            "# speaker wiring\nDevice,Layout,label\n\n1,0,front-left\n# mid table\n0,1,front-right\n",
            2,
            8,
        )
        .unwrap();
        // Columns can appear in any order; header is case-insensitive
        assert_eq!(
            remap.entries(),
            &[
                RemapEntry { layout_channel: 0, device_channel: 1 },
                RemapEntry { layout_channel: 1, device_channel: 0 },
            ]
        );
    }

    #[test]
    fn out_of_range_rows_are_dropped() {
        let remap = OutputRemap::parse("layout,device\n0,0\n9,1\n1,9\n", 2, 4).unwrap();
        assert_eq!(remap.entries().len(), 1);
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(OutputRemap::parse("bogus,columns\n0,0\n", 2, 2).is_err());
        assert!(OutputRemap::parse("layout,device\nx,0\n", 2, 2).is_err());
        assert!(OutputRemap::parse("", 2, 2).is_err());
    }

    #[test]
    fn identity_apply_copies_channels() {
        let render = render_with(&[0.1, 0.2], 4);
        let remap = OutputRemap::identity(2);
        let mut out = vec![9.0f32; 4 * 3]; // device has a third, unmapped channel
        remap.apply(&render, &mut out, 4, 3);

        for frame in 0..4 {
            assert_eq!(out[frame * 3], 0.1);
            assert_eq!(out[frame * 3 + 1], 0.2);
            assert_eq!(out[frame * 3 + 2], 0.0);
        }
    }

    #[test]
    fn accumulating_rows_sum_on_the_device_channel() {
        let render = render_with(&[0.1, 0.25], 4);
        let remap = OutputRemap::parse("layout,device\n0,5\n1,5\n", 2, 8).unwrap();
        let mut out = vec![9.0f32; 4 * 8];
        remap.apply(&render, &mut out, 4, 8);

        for frame in 0..4 {
            for channel in 0..8 {
                let expected = if channel == 5 { 0.35 } else { 0.0 };
                assert!((out[frame * 8 + channel] - expected).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn identity_csv_matches_no_remap_output() {
        let render = render_with(&[0.3, -0.4], 8);
        let mut from_csv = vec![0.0f32; 8 * 2];
        let mut from_default = vec![0.0f32; 8 * 2];

        OutputRemap::parse("layout,device\n0,0\n1,1\n", 2, 2)
            .unwrap()
            .apply(&render, &mut from_csv, 8, 2);
        OutputRemap::identity(2).apply(&render, &mut from_default, 8, 2);

        assert_eq!(from_csv, from_default);
    }
}
