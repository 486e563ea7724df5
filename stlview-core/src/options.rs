//! Preview configuration options

use crate::point::Point3f;
use serde::{Deserialize, Serialize};

/// An 8-bit RGB color
pub type Rgb = [u8; 3];

/// Output resolution multiplier for still previews
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    /// Resolution multiplier applied to the requested output size
    pub fn multiplier(&self) -> f32 {
        match self {
            Quality::Low => 1.0,
            Quality::Medium => 1.5,
            Quality::High => 2.0,
        }
    }
}

/// Light intensities for the preview lighting rig
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lighting {
    pub ambient_intensity: f32,
    pub directional_intensity: f32,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient_intensity: 0.4,
            directional_intensity: 1.0,
        }
    }
}

/// Configuration for a still preview render.
///
/// All fields have defaults; callers typically override only the output
/// size and the model color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewOptions {
    pub width: u32,
    pub height: u32,
    pub background_color: Rgb,
    pub model_color: Rgb,
    pub camera_position: Option<Point3f>,
    pub lighting: Lighting,
    pub quality: Quality,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            width: 400,
            height: 300,
            background_color: [240, 240, 240],
            model_color: [70, 130, 220],
            camera_position: None,
            lighting: Lighting::default(),
            quality: Quality::High,
        }
    }
}

impl PreviewOptions {
    /// Output dimensions after applying the quality multiplier
    pub fn output_size(&self) -> (u32, u32) {
        let m = self.quality.multiplier();
        (
            ((self.width as f32 * m).round() as u32).max(1),
            ((self.height as f32 * m).round() as u32).max(1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = PreviewOptions::default();
        assert_eq!(opts.width, 400);
        assert_eq!(opts.height, 300);
        assert_eq!(opts.quality, Quality::High);
        assert!(opts.camera_position.is_none());
    }

    #[test]
    fn quality_scales_output_resolution() {
        let mut opts = PreviewOptions::default();
        opts.quality = Quality::Low;
        assert_eq!(opts.output_size(), (400, 300));
        opts.quality = Quality::Medium;
        assert_eq!(opts.output_size(), (600, 450));
        opts.quality = Quality::High;
        assert_eq!(opts.output_size(), (800, 600));
    }
}
