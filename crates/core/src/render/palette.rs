use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::VisualizerError;

/// Straight (non-premultiplied) RGBA color with a fractional alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0.0);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 1.0);

    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Same color with its alpha replaced (clamped to `[0, 1]`).
    pub fn with_alpha(self, alpha: f32) -> Self {
        Self {
            a: alpha.clamp(0.0, 1.0),
            ..self
        }
    }
}

/// The closed set of color schemes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    #[default]
    Neon,
    Sunset,
    Ocean,
    Forest,
    Mono,
}

/// Resolved colors of a [`Palette`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteColors {
    pub primary: Rgba,
    pub secondary: Rgba,
    pub glow: Rgba,
    pub background: Rgba,
}

impl PaletteColors {
    /// Primary color at the given opacity.
    pub fn color(&self, alpha: f32) -> Rgba {
        self.primary.with_alpha(alpha)
    }

    pub fn secondary_color(&self, alpha: f32) -> Rgba {
        self.secondary.with_alpha(alpha)
    }
}

impl Palette {
    pub const ALL: [Palette; 5] = [
        Palette::Neon,
        Palette::Sunset,
        Palette::Ocean,
        Palette::Forest,
        Palette::Mono,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Palette::Neon => "neon",
            Palette::Sunset => "sunset",
            Palette::Ocean => "ocean",
            Palette::Forest => "forest",
            Palette::Mono => "mono",
        }
    }

    pub fn colors(self) -> PaletteColors {
        match self {
            Palette::Neon => PaletteColors {
                primary: Rgba::opaque(0, 255, 213),
                secondary: Rgba::opaque(255, 0, 170),
                glow: Rgba::new(0, 255, 213, 0.8),
                background: Rgba::opaque(5, 5, 16),
            },
            Palette::Sunset => PaletteColors {
                primary: Rgba::opaque(255, 120, 60),
                secondary: Rgba::opaque(255, 200, 80),
                glow: Rgba::new(255, 90, 40, 0.8),
                background: Rgba::opaque(20, 6, 12),
            },
            Palette::Ocean => PaletteColors {
                primary: Rgba::opaque(60, 160, 255),
                secondary: Rgba::opaque(120, 240, 255),
                glow: Rgba::new(40, 120, 255, 0.8),
                background: Rgba::opaque(2, 10, 24),
            },
            Palette::Forest => PaletteColors {
                primary: Rgba::opaque(90, 220, 110),
                secondary: Rgba::opaque(200, 240, 120),
                glow: Rgba::new(60, 200, 90, 0.8),
                background: Rgba::opaque(6, 16, 8),
            },
            Palette::Mono => PaletteColors {
                primary: Rgba::opaque(235, 235, 235),
                secondary: Rgba::opaque(150, 150, 150),
                glow: Rgba::new(255, 255, 255, 0.6),
                background: Rgba::opaque(0, 0, 0),
            },
        }
    }
}

impl FromStr for Palette {
    type Err = VisualizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|palette| palette.name().eq_ignore_ascii_case(s.trim()))
            .ok_or(VisualizerError::InvalidInput("unknown palette"))
    }
}
