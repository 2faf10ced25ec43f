//! Tool settings and their serialized form.
//!
//! The crate does not discover or parse configuration files; it exposes a
//! versioned, serde-round-trippable [`Config`] that the embedding application
//! loads and saves however it likes, plus the live [`ToolSettings`] the
//! session mutates at runtime.

use serde::{Deserialize, Serialize};

use crate::annotation::Point;
use crate::error::Error;

/// Current configuration format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Smallest allowed stroke width, in image pixels.
pub const LINE_SIZE_MIN: f32 = 1.0;
/// Largest allowed stroke width, in image pixels.
pub const LINE_SIZE_MAX: f32 = 50.0;
/// Smallest allowed text size, in image pixels.
pub const TEXT_SIZE_MIN: f32 = 10.0;
/// Largest allowed text size, in image pixels.
pub const TEXT_SIZE_MAX: f32 = 50.0;
/// Smallest allowed fill transparency, in percent.
pub const TRANSPARENCY_MIN: f32 = 5.0;
/// Largest allowed fill transparency, in percent.
pub const TRANSPARENCY_MAX: f32 = 95.0;

/// Live, clamped tool parameters mutated by the session.
///
/// A pending paint picks up stroke and text-size changes immediately, so
/// scrolling the size control while drawing resizes the live shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Stroke width for brush, highlighter and shape outlines
    #[serde(default = "default_line_size")]
    pub line_size: f32,

    /// Font size for text paints
    #[serde(default = "default_text_size")]
    pub text_size: f32,

    /// Font family for text paints
    #[serde(default = "default_text_font")]
    pub text_font: String,

    /// Whether shapes are filled rather than stroked
    #[serde(default)]
    pub fill_shape: bool,

    /// Fill transparency in percent, applied to the configured color's alpha
    #[serde(default = "default_transparency")]
    pub transparency: f32,

    /// User-picked custom color as a hex string, e.g. `#rrggbb`
    #[serde(default = "default_custom_color")]
    pub custom_color: String,
}

fn default_line_size() -> f32 {
    5.0
}

fn default_text_size() -> f32 {
    20.0
}

fn default_text_font() -> String {
    "sans-serif".to_string()
}

fn default_transparency() -> f32 {
    50.0
}

fn default_custom_color() -> String {
    "#00000000".to_string()
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            line_size: default_line_size(),
            text_size: default_text_size(),
            text_font: default_text_font(),
            fill_shape: false,
            transparency: default_transparency(),
            custom_color: default_custom_color(),
        }
    }
}

impl ToolSettings {
    /// Set the stroke width, clamped to the allowed range.
    pub fn set_line_size(&mut self, size: f32) {
        self.line_size = size.clamp(LINE_SIZE_MIN, LINE_SIZE_MAX);
    }

    /// Nudge the stroke width by `delta`, clamped.
    pub fn adjust_line_size(&mut self, delta: f32) {
        self.set_line_size(self.line_size + delta);
    }

    /// Set the text size, clamped to the allowed range.
    pub fn set_text_size(&mut self, size: f32) {
        self.text_size = size.clamp(TEXT_SIZE_MIN, TEXT_SIZE_MAX);
    }

    /// Nudge the text size by `delta`, clamped.
    pub fn adjust_text_size(&mut self, delta: f32) {
        self.set_text_size(self.text_size + delta);
    }

    /// Set the fill transparency percentage, clamped to the allowed range.
    pub fn set_transparency(&mut self, percent: f32) {
        self.transparency = percent.clamp(TRANSPARENCY_MIN, TRANSPARENCY_MAX);
    }

    /// Alpha value derived from the transparency percentage.
    pub fn fill_alpha(&self) -> f32 {
        1.0 - self.transparency / 100.0
    }
}

/// Optional aspect-ratio constraint for the crop tool. `0 / 0` means free.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CropSettings {
    /// Aspect numerator (width units)
    #[serde(default)]
    pub aspect_w: f32,
    /// Aspect denominator (height units)
    #[serde(default)]
    pub aspect_h: f32,
}

impl CropSettings {
    /// The width/height ratio to enforce, or `None` when unconstrained.
    pub fn ratio(&self) -> Option<f32> {
        if self.aspect_w > 0.0 && self.aspect_h > 0.0 {
            Some(self.aspect_w / self.aspect_h)
        } else {
            None
        }
    }

    /// Constrain a dragged `to` point so the resolved rectangle keeps the
    /// configured ratio. The horizontal span is authoritative; the vertical
    /// span is recomputed from it, preserving the drag direction.
    pub fn constrain(&self, from: Point, to: Point) -> Point {
        let Some(ratio) = self.ratio() else {
            return to;
        };
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let height = dx.abs() / ratio;
        let signed = if dy < 0.0 { -height } else { height };
        Point::new(to.x, from.y + signed)
    }
}

/// Versioned, export/import-able editor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Version of the configuration format
    pub version: u32,

    /// Default tool parameters the session starts from
    #[serde(default)]
    pub tools: ToolSettings,

    /// Crop aspect constraint
    #[serde(default)]
    pub crop: CropSettings,

    /// External upscale command template with `%INPUT%`/`%OUTPUT%`
    /// placeholders, if configured
    #[serde(default)]
    pub upscale_command: Option<String>,

    /// Enhancement preset identifier handed to the enhancer collaborator
    #[serde(default)]
    pub enhance_preset: Option<String>,
}

impl Config {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            tools: ToolSettings::default(),
            crop: CropSettings::default(),
            upscale_command: None,
            enhance_preset: None,
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize configuration from JSON, rejecting files written by a
    /// newer format version.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        if config.version > CONFIG_VERSION {
            return Err(Error::UnsupportedFormat {
                message: format!(
                    "configuration version {} is newer than supported version {}",
                    config.version, CONFIG_VERSION
                ),
            });
        }
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_json_round_trip() {
        let mut config = Config::new();
        config.tools.line_size = 12.0;
        config.upscale_command = Some("upscaler %INPUT% %OUTPUT%".to_string());

        let json = config.to_json().unwrap();
        let restored = Config::from_json(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_config_rejects_newer_version() {
        let json = format!("{{\"version\": {}}}", CONFIG_VERSION + 1);
        assert!(Config::from_json(&json).is_err());
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config = Config::from_json("{\"version\": 1}").unwrap();
        assert_eq!(config.tools, ToolSettings::default());
        assert!(config.upscale_command.is_none());
    }

    #[test]
    fn test_tool_sizes_clamp_to_limits() {
        let mut tools = ToolSettings::default();
        tools.adjust_line_size(1000.0);
        assert_eq!(tools.line_size, LINE_SIZE_MAX);
        tools.adjust_line_size(-1000.0);
        assert_eq!(tools.line_size, LINE_SIZE_MIN);

        tools.set_text_size(0.0);
        assert_eq!(tools.text_size, TEXT_SIZE_MIN);

        tools.set_transparency(100.0);
        assert_eq!(tools.transparency, TRANSPARENCY_MAX);
    }

    #[test]
    fn test_crop_aspect_constrains_drag() {
        let crop = CropSettings {
            aspect_w: 2.0,
            aspect_h: 1.0,
        };
        let from = Point::new(10.0, 10.0);

        let to = crop.constrain(from, Point::new(30.0, 100.0));
        assert_eq!(to.x, 30.0);
        assert_eq!(to.y, 20.0);

        // Dragging up keeps the direction
        let to = crop.constrain(from, Point::new(-10.0, -100.0));
        assert_eq!(to.y, 0.0);
    }

    #[test]
    fn test_crop_zero_aspect_is_free() {
        let crop = CropSettings::default();
        let to = Point::new(42.0, 7.0);
        assert_eq!(crop.constrain(Point::new(0.0, 0.0), to), to);
    }
}
