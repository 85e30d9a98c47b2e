//! Mode parameters attached to each upload request

use reqwest::multipart::Form;
use serde::{Deserialize, Serialize};

use crate::processing::Mode;
use crate::provider::Dimensions;

/// Resize presets offered next to the custom inputs
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Percentage {
    #[default]
    Fifty,
    SeventyFive,
}

impl Percentage {
    pub fn value(&self) -> u32 {
        match self {
            Percentage::Fifty => 50,
            Percentage::SeventyFive => 75,
        }
    }

    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            50 => Some(Percentage::Fifty),
            75 => Some(Percentage::SeventyFive),
            _ => None,
        }
    }
}

/// Either custom dimensions or a preset, never both
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResizeParams {
    Custom {
        width: Option<u32>,
        height: Option<u32>,
        aspect_ratio_locked: bool,
    },
    Preset(Percentage),
}

/// Per-mode form fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeParams {
    Compressor,
    Converter { target_format: String },
    Resizer(ResizeParams),
}

impl ModeParams {
    pub fn mode(&self) -> Mode {
        match self {
            ModeParams::Compressor => Mode::Compressor,
            ModeParams::Converter { .. } => Mode::Converter,
            ModeParams::Resizer(_) => Mode::Resizer,
        }
    }

    /// Append `mode` and the mode-specific fields to a multipart form
    pub fn apply(&self, form: Form) -> Form {
        let form = form.text("mode", self.mode().as_str());

        match self {
            ModeParams::Compressor => form,
            ModeParams::Converter { target_format } => {
                form.text("targetFormat", target_format.clone())
            }
            ModeParams::Resizer(ResizeParams::Custom {
                width,
                height,
                aspect_ratio_locked,
            }) => form
                .text("customWidth", optional_number(*width))
                .text("customHeight", optional_number(*height))
                .text("aspectRatioLocked", aspect_ratio_locked.to_string()),
            ModeParams::Resizer(ResizeParams::Preset(percentage)) => {
                form.text("resizePercentage", percentage.value().to_string())
            }
        }
    }
}

fn optional_number(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Resizer control state: preset selection, custom inputs and aspect-ratio lock
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeControls {
    preset: Percentage,
    custom_width: Option<u32>,
    custom_height: Option<u32>,
    aspect_ratio_locked: bool,
    aspect_ratio: Option<f64>,
}

impl Default for ResizeControls {
    fn default() -> Self {
        Self {
            preset: Percentage::Fifty,
            custom_width: None,
            custom_height: None,
            aspect_ratio_locked: true,
            aspect_ratio: None,
        }
    }
}

impl ResizeControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a preset; custom values are cleared
    pub fn set_preset(&mut self, preset: Percentage) {
        self.preset = preset;
        self.custom_width = None;
        self.custom_height = None;
    }

    /// With the lock on and a known ratio, the height follows the width
    pub fn set_custom_width(&mut self, width: Option<u32>) {
        self.custom_width = width;
        if let (Some(width), Some(ratio)) = (width, self.locked_ratio()) {
            self.custom_height = Some((width as f64 / ratio).round() as u32);
        }
    }

    /// With the lock on and a known ratio, the width follows the height
    pub fn set_custom_height(&mut self, height: Option<u32>) {
        self.custom_height = height;
        if let (Some(height), Some(ratio)) = (height, self.locked_ratio()) {
            self.custom_width = Some((height as f64 * ratio).round() as u32);
        }
    }

    pub fn toggle_lock(&mut self) -> bool {
        self.aspect_ratio_locked = !self.aspect_ratio_locked;
        self.aspect_ratio_locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.aspect_ratio_locked = locked;
    }

    /// Remember the ratio of the first image seen; later images do not replace it
    pub fn remember_aspect_ratio(&mut self, dimensions: Dimensions) {
        if self.aspect_ratio.is_none() {
            self.aspect_ratio = dimensions.aspect_ratio();
        }
    }

    pub fn aspect_ratio(&self) -> Option<f64> {
        self.aspect_ratio
    }

    pub fn is_locked(&self) -> bool {
        self.aspect_ratio_locked
    }

    pub fn preset(&self) -> Percentage {
        self.preset
    }

    /// A single custom dimension is completed from the remembered ratio while locked,
    /// so a ratio learned after the value was entered still applies
    pub fn params(&self) -> ResizeParams {
        let (width, height) = match (self.custom_width, self.custom_height, self.locked_ratio()) {
            (None, None, _) => return ResizeParams::Preset(self.preset),
            (Some(width), None, Some(ratio)) => {
                (Some(width), Some((width as f64 / ratio).round() as u32))
            }
            (None, Some(height), Some(ratio)) => {
                (Some((height as f64 * ratio).round() as u32), Some(height))
            }
            (width, height, _) => (width, height),
        };

        ResizeParams::Custom {
            width,
            height,
            aspect_ratio_locked: self.aspect_ratio_locked,
        }
    }

    fn locked_ratio(&self) -> Option<f64> {
        if self.aspect_ratio_locked {
            self.aspect_ratio
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fifty_percent_preset() {
        let controls = ResizeControls::new();
        assert!(controls.is_locked());
        assert_eq!(controls.params(), ResizeParams::Preset(Percentage::Fifty));
    }

    #[test]
    fn test_locked_width_fills_height() {
        let mut controls = ResizeControls::new();
        controls.remember_aspect_ratio(Dimensions::new(1600, 900));
        controls.set_custom_width(Some(800));

        assert_eq!(
            controls.params(),
            ResizeParams::Custom {
                width: Some(800),
                height: Some(450),
                aspect_ratio_locked: true,
            }
        );

        controls.set_custom_height(Some(300));
        // 300 * 16/9 = 533.33
        assert!(matches!(
            controls.params(),
            ResizeParams::Custom { width: Some(533), height: Some(300), .. }
        ));
    }

    #[test]
    fn test_unlocked_or_unknown_ratio_leaves_other_dimension() {
        let mut controls = ResizeControls::new();
        controls.set_custom_width(Some(640));
        assert!(matches!(
            controls.params(),
            ResizeParams::Custom { width: Some(640), height: None, .. }
        ));

        let mut controls = ResizeControls::new();
        controls.remember_aspect_ratio(Dimensions::new(400, 200));
        assert!(!controls.toggle_lock());
        controls.set_custom_height(Some(100));
        assert_eq!(
            controls.params(),
            ResizeParams::Custom {
                width: None,
                height: Some(100),
                aspect_ratio_locked: false,
            }
        );
    }

    #[test]
    fn test_ratio_learned_after_input_completes_locked_dimension() {
        let mut controls = ResizeControls::new();
        controls.set_locked(true);
        controls.set_custom_width(Some(800));
        controls.remember_aspect_ratio(Dimensions::new(1600, 900));

        assert_eq!(
            controls.params(),
            ResizeParams::Custom {
                width: Some(800),
                height: Some(450),
                aspect_ratio_locked: true,
            }
        );

        controls.set_locked(false);
        assert_eq!(
            controls.params(),
            ResizeParams::Custom {
                width: Some(800),
                height: None,
                aspect_ratio_locked: false,
            }
        );
    }

    #[test]
    fn test_first_aspect_ratio_wins() {
        let mut controls = ResizeControls::new();
        controls.remember_aspect_ratio(Dimensions::new(200, 100));
        controls.remember_aspect_ratio(Dimensions::new(100, 200));
        assert_eq!(controls.aspect_ratio(), Some(2.0));
    }

    #[test]
    fn test_preset_clears_custom_values() {
        let mut controls = ResizeControls::new();
        controls.set_custom_width(Some(10));
        controls.set_preset(Percentage::SeventyFive);
        assert_eq!(controls.params(), ResizeParams::Preset(Percentage::SeventyFive));
    }

    #[test]
    fn test_percentage_values() {
        assert_eq!(Percentage::from_value(75), Some(Percentage::SeventyFive));
        assert_eq!(Percentage::from_value(60), None);
        assert_eq!(Percentage::Fifty.value(), 50);
    }

    #[test]
    fn test_mode_params_report_mode() {
        assert_eq!(ModeParams::Compressor.mode(), Mode::Compressor);
        assert_eq!(
            ModeParams::Resizer(ResizeParams::Preset(Percentage::Fifty)).mode(),
            Mode::Resizer
        );
    }
}
