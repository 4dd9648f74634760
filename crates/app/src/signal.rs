//! Deterministic test signal so the pipeline can run without audio hardware.

use std::f32::consts::TAU;

use audioscope_core::{Result, VideoFrame};

/// Sine sweep that glides between two frequencies and back, with a slower
/// amplitude swell so every visual mode has something to react to.
#[derive(Debug, Clone)]
pub struct ToneSweep {
    sample_rate: f32,
    low_hz: f32,
    high_hz: f32,
    period_secs: f32,
    amplitude: f32,
    phase: f32,
    elapsed: f32,
}

impl ToneSweep {
    pub fn new(sample_rate: u32, low_hz: f32, high_hz: f32, period_secs: f32) -> Self {
        Self {
            sample_rate: sample_rate.max(1) as f32,
            low_hz,
            high_hz,
            period_secs: period_secs.max(f32::EPSILON),
            amplitude: 0.6,
            phase: 0.0,
            elapsed: 0.0,
        }
    }

    /// Current position in the sweep, `0` at the low end and `1` at the top.
    fn position(&self) -> f32 {
        let cycle = (self.elapsed / self.period_secs).fract();
        1.0 - (2.0 * cycle - 1.0).abs()
    }

    pub fn frequency(&self) -> f32 {
        // Exponential glide so each octave takes the same time.
        self.low_hz * (self.high_hz / self.low_hz).powf(self.position())
    }

    /// Replaces the contents of `out` with the next `len` samples.
    pub fn fill(&mut self, len: usize, out: &mut Vec<f32>) {
        out.clear();
        out.reserve(len);
        let step = 1.0 / self.sample_rate;

        for _ in 0..len {
            let swell = 0.55 + 0.45 * (self.elapsed * TAU * 0.5).sin();
            let fundamental = self.phase.sin();
            let overtone = 0.3 * (self.phase * 3.0).sin();
            out.push(self.amplitude * swell * (fundamental + overtone) / 1.3);

            self.phase = (self.phase + TAU * self.frequency() * step) % TAU;
            self.elapsed += step;
        }
    }
}

/// Slowly drifting color bars standing in for decoded video.
pub fn test_card(width: u32, height: u32, frame: u64) -> Result<VideoFrame> {
    const BARS: [[u8; 3]; 6] = [
        [192, 192, 0],
        [0, 192, 192],
        [0, 192, 0],
        [192, 0, 192],
        [192, 0, 0],
        [0, 0, 192],
    ];

    let width = width.max(1);
    let height = height.max(1);
    let shift = (frame % u64::from(width)) as u32;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);

    for _ in 0..height {
        for x in 0..width {
            let bar = ((x + shift) % width) as usize * BARS.len() / width as usize;
            let [r, g, b] = BARS[bar];
            pixels.extend_from_slice(&[r, g, b, 255]);
        }
    }

    VideoFrame::new(width, height, pixels)
}
