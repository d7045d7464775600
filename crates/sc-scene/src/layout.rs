//! Speaker layout model, JSON loading, and derived parameters
//!
//! Layout file shape:
//!
//! ```json
//! {
//!   "speakers": [{"azimuth": -0.5236, "elevation": 0.0, "radius": 2.0, "deviceChannel": 0}, ...],
//!   "subwoofers": [{"deviceChannel": 5}, ...]
//! }
//! ```
//!
//! Angles are radians, radius is meters.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::{SceneError, SceneResult};

/// Layouts whose elevation span is below this are treated as 2D (3 degrees)
const FLAT_LAYOUT_SPAN_RAD: f32 = 3.0 * std::f32::consts::PI / 180.0;

/// One loudspeaker position
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Speaker {
    /// Azimuth in radians (0 = front, positive = right)
    pub azimuth: f32,
    /// Elevation in radians
    pub elevation: f32,
    /// Distance from the listening position in meters
    pub radius: f32,
    /// Physical device channel this speaker is cabled to
    #[serde(rename = "deviceChannel")]
    pub device_channel: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RawSubwoofer {
    #[serde(rename = "deviceChannel")]
    device_channel: usize,
}

#[derive(Deserialize)]
struct RawLayout {
    speakers: Vec<Speaker>,
    #[serde(default)]
    subwoofers: Vec<RawSubwoofer>,
}

/// A validated speaker layout with derived parameters
///
/// Render channels for speakers are their indices in `speakers` (0-based,
/// consecutive); subwoofers render at their device-channel indices. The
/// output remap stage maps render channels onto the device.
#[derive(Debug, Clone)]
pub struct SpeakerLayout {
    pub speakers: Vec<Speaker>,
    /// Subwoofer device-channel indices
    pub subwoofers: Vec<usize>,
    /// Median speaker distance in meters
    pub radius: f32,
    /// Lowest speaker elevation in radians
    pub el_min: f32,
    /// Highest speaker elevation in radians
    pub el_max: f32,
    /// Elevation span is below the flat-layout threshold
    pub is_2d: bool,
    /// Render/device channel count the engine must drive
    pub output_channels: usize,
}

impl SpeakerLayout {
    /// Load and validate a layout from a JSON file
    pub fn load(path: impl AsRef<Path>) -> SceneResult<Self> {
        let file = File::open(path.as_ref())?;
        let raw: RawLayout = serde_json::from_reader(BufReader::new(file))?;
        Self::from_raw(raw)
    }

    /// Parse a layout from a JSON string (used by tests)
    pub fn from_json(json: &str) -> SceneResult<Self> {
        let raw: RawLayout = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Build a layout directly from parts (used by tests)
    pub fn from_parts(speakers: Vec<Speaker>, subwoofers: Vec<usize>) -> SceneResult<Self> {
        Self::from_raw(RawLayout {
            speakers,
            subwoofers: subwoofers
                .into_iter()
                .map(|device_channel| RawSubwoofer { device_channel })
                .collect(),
        })
    }

    fn from_raw(raw: RawLayout) -> SceneResult<Self> {
        if raw.speakers.is_empty() {
            return Err(SceneError::InvalidLayout("layout has no speakers".into()));
        }
        if raw.speakers.iter().any(|s| !(s.radius > 0.0)) {
            return Err(SceneError::InvalidLayout(
                "every speaker radius must be positive".into(),
            ));
        }

        let subwoofers: Vec<usize> = raw.subwoofers.iter().map(|s| s.device_channel).collect();

        let radius = median_radius(&raw.speakers);

        let mut el_min = f32::MAX;
        let mut el_max = f32::MIN;
        for s in &raw.speakers {
            el_min = el_min.min(s.elevation);
            el_max = el_max.max(s.elevation);
        }
        let is_2d = (el_max - el_min) < FLAT_LAYOUT_SPAN_RAD;

        let max_speaker_index = raw.speakers.len() - 1;
        let max_sub_channel = subwoofers.iter().copied().max().unwrap_or(0);
        let output_channels = max_speaker_index.max(max_sub_channel) + 1;

        Ok(Self {
            speakers: raw.speakers,
            subwoofers,
            radius,
            el_min,
            el_max,
            is_2d,
            output_channels,
        })
    }

    /// Number of loudspeakers (non-subwoofer)
    #[inline]
    pub fn speaker_count(&self) -> usize {
        self.speakers.len()
    }
}

fn median_radius(speakers: &[Speaker]) -> f32 {
    let mut radii: Vec<f32> = speakers.iter().map(|s| s.radius).collect();
    radii.sort_by(f32::total_cmp);
    let mid = radii.len() / 2;
    if radii.len() % 2 == 1 {
        radii[mid]
    } else {
        0.5 * (radii[mid - 1] + radii[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn speaker(azimuth: f32, elevation: f32, radius: f32, device_channel: usize) -> Speaker {
        Speaker {
            azimuth,
            elevation,
            radius,
            device_channel,
        }
    }

    #[test]
    fn derives_radius_and_bounds() {
        let layout = SpeakerLayout::from_parts(
            vec![
                speaker(-0.5, 0.0, 2.0, 0),
                speaker(0.5, 0.0, 3.0, 1),
                speaker(0.0, 0.6, 4.0, 2),
            ],
            vec![],
        )
        .unwrap();

        assert_abs_diff_eq!(layout.radius, 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(layout.el_min, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(layout.el_max, 0.6, epsilon = 1e-6);
        assert!(!layout.is_2d);
        assert_eq!(layout.output_channels, 3);
    }

    #[test]
    fn flat_layout_is_2d() {
        let layout = SpeakerLayout::from_parts(
            vec![speaker(-0.5, 0.0, 2.0, 0), speaker(0.5, 0.01, 2.0, 1)],
            vec![],
        )
        .unwrap();
        assert!(layout.is_2d);
    }

    #[test]
    fn subwoofers_extend_output_channels() {
        let layout = SpeakerLayout::from_parts(
            vec![speaker(-0.5, 0.0, 2.0, 0), speaker(0.5, 0.0, 2.0, 1)],
            vec![5, 6],
        )
        .unwrap();
        assert_eq!(layout.output_channels, 7);
        assert_eq!(layout.subwoofers, vec![5, 6]);
    }

    #[test]
    fn parses_json() {
        let layout = SpeakerLayout::from_json(
            r#"{
                "speakers": [
                    {"azimuth": -0.5236, "elevation": 0.0, "radius": 2.0, "deviceChannel": 0},
                    {"azimuth": 0.5236, "elevation": 0.0, "radius": 2.0, "deviceChannel": 1}
                ],
                "subwoofers": [{"deviceChannel": 3}]
            }"#,
        )
        .unwrap();
        assert_eq!(layout.speaker_count(), 2);
        assert_eq!(layout.subwoofers, vec![3]);
        assert_eq!(layout.output_channels, 4);
    }

    #[test]
    fn empty_layout_is_rejected() {
        assert!(SpeakerLayout::from_json(r#"{"speakers": []}"#).is_err());
    }
}
