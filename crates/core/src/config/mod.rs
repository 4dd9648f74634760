use std::{path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{audio::DEFAULT_FEED_CAPACITY, Palette, Result, VisualizerError};

/// Lower bound of the sensitivity range offered to users.
pub const MIN_SENSITIVITY: f32 = 0.1;
/// Upper bound of the sensitivity range offered to users.
pub const MAX_SENSITIVITY: f32 = 5.0;
/// Particles drawn by the full visualiser.
pub const DEFAULT_PARTICLE_COUNT: usize = 48;
/// Particles drawn by the compact visualiser.
pub const COMPACT_PARTICLE_COUNT: usize = 32;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub render: RenderConfig,
    pub surface: SurfaceConfig,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.render.validate()?;
        self.surface.validate()?;
        if self.audio.feed_capacity == 0 {
            return Err(VisualizerError::InvalidInput(
                "feed capacity must be positive",
            ));
        }
        Ok(())
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples retained per source for analysis.
    pub feed_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

/// The four drawing algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualMode {
    #[default]
    Waveform,
    Bars,
    Radial,
    Particles,
}

impl VisualMode {
    pub const ALL: [VisualMode; 4] = [
        VisualMode::Waveform,
        VisualMode::Bars,
        VisualMode::Radial,
        VisualMode::Particles,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VisualMode::Waveform => "waveform",
            VisualMode::Bars => "bars",
            VisualMode::Radial => "radial",
            VisualMode::Particles => "particles",
        }
    }
}

impl FromStr for VisualMode {
    type Err = VisualizerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s.trim()))
            .ok_or(VisualizerError::InvalidInput("unknown visual mode"))
    }
}

/// Settings that may change between any two frames without touching the
/// signal graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub sensitivity: f32,
    pub mode: VisualMode,
    pub palette: Palette,
    pub particle_count: usize,
}

impl RenderConfig {
    /// Same settings with the sensitivity clamped into the user range. A
    /// value that is not a number leaves the sensitivity unchanged.
    pub fn with_sensitivity(mut self, sensitivity: f32) -> Self {
        if !sensitivity.is_nan() {
            self.sensitivity = sensitivity.clamp(MIN_SENSITIVITY, MAX_SENSITIVITY);
        }
        self
    }

    pub fn with_mode(mut self, mode: VisualMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    /// The variant used by small embeds: fewer particles.
    pub fn compact(mut self) -> Self {
        self.particle_count = COMPACT_PARTICLE_COUNT;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.sensitivity.is_finite() || self.sensitivity <= 0.0 {
            return Err(VisualizerError::InvalidInput(
                "sensitivity must be a positive number",
            ));
        }
        if self.particle_count == 0 {
            return Err(VisualizerError::InvalidInput(
                "particle count must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            mode: VisualMode::default(),
            palette: Palette::default(),
            particle_count: DEFAULT_PARTICLE_COUNT,
        }
    }
}

/// Size of an offscreen surface in layout units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub width: f32,
    pub height: f32,
    pub pixel_ratio: f32,
}

impl SurfaceConfig {
    pub fn validate(&self) -> Result<()> {
        let finite = self.width.is_finite() && self.height.is_finite();
        if !finite || self.width < 0.0 || self.height < 0.0 {
            return Err(VisualizerError::InvalidInput(
                "surface size must be finite and non-negative",
            ));
        }
        if !self.pixel_ratio.is_finite() || self.pixel_ratio <= 0.0 {
            return Err(VisualizerError::InvalidInput(
                "pixel ratio must be a positive number",
            ));
        }
        Ok(())
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 640.0,
            height: 360.0,
            pixel_ratio: 1.0,
        }
    }
}
