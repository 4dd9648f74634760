use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{Result, SampleFeed, VisualizerError};

pub mod session;

pub use session::AnalysisSession;

/// Transform size used by the main visualiser.
pub const MAIN_FFT_SIZE: usize = 512;
/// Transform size used by the auxiliary activity monitor.
pub const MONITOR_FFT_SIZE: usize = 256;

const DEFAULT_SMOOTHING: f32 = 0.8;
const DEFAULT_MIN_DECIBELS: f32 = -100.0;
const DEFAULT_MAX_DECIBELS: f32 = -30.0;

/// Construction parameters for an [`Analyser`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserOptions {
    pub fft_size: usize,
    /// Temporal smoothing of magnitudes in `[0, 1)`.
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl AnalyserOptions {
    pub fn with_fft_size(fft_size: usize) -> Self {
        Self {
            fft_size,
            ..Self::default()
        }
    }

    /// Number of frequency bins, half the transform size.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn validate(&self) -> Result<()> {
        if self.fft_size < 32 || !self.fft_size.is_power_of_two() {
            return Err(VisualizerError::InvalidInput(
                "fft size must be a power of two of at least 32",
            ));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(VisualizerError::InvalidInput(
                "smoothing must lie in [0, 1)",
            ));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(VisualizerError::InvalidInput(
                "min decibels must be below max decibels",
            ));
        }
        Ok(())
    }
}

impl Default for AnalyserOptions {
    fn default() -> Self {
        Self {
            fft_size: MAIN_FFT_SIZE,
            smoothing: DEFAULT_SMOOTHING,
            min_decibels: DEFAULT_MIN_DECIBELS,
            max_decibels: DEFAULT_MAX_DECIBELS,
        }
    }
}

/// Turns the tail of a sample feed into byte time-domain and frequency-domain
/// snapshots.
///
/// All working memory is allocated up front so snapshots can be taken every
/// frame without touching the allocator.
pub struct Analyser {
    options: AnalyserOptions,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    fft: FftResources,
}

impl Analyser {
    pub fn new(options: AnalyserOptions) -> Result<Self> {
        options.validate()?;

        let size = options.fft_size;
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            samples: vec![0.0; size],
            plan,
        };

        Ok(Self {
            options,
            window: (0..size).map(|i| blackman_value(i, size)).collect(),
            smoothed: vec![0.0; options.bin_count()],
            fft,
        })
    }

    pub fn options(&self) -> &AnalyserOptions {
        &self.options
    }

    pub fn fft_size(&self) -> usize {
        self.options.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.options.bin_count()
    }

    /// Reads the newest transform window from `feed` and writes byte
    /// snapshots into both buffers.
    pub fn snapshot(
        &mut self,
        feed: &SampleFeed,
        time: &mut [u8],
        frequency: &mut [u8],
    ) -> Result<()> {
        feed.copy_latest(&mut self.fft.samples)?;
        self.write_time_domain(time);
        self.write_frequency_domain(frequency)
    }

    /// Writes the snapshot of a graph that carries no audio.
    pub fn silence(time: &mut [u8], frequency: &mut [u8]) {
        time.fill(128);
        frequency.fill(0);
    }

    fn write_time_domain(&self, out: &mut [u8]) {
        for (slot, sample) in out.iter_mut().zip(self.fft.samples.iter()) {
            *slot = (128.0 * (1.0 + sample)).clamp(0.0, 255.0) as u8;
        }
    }

    fn write_frequency_domain(&mut self, out: &mut [u8]) -> Result<()> {
        let size = self.options.fft_size;
        for ((input, sample), weight) in self
            .fft
            .input
            .iter_mut()
            .zip(self.fft.samples.iter())
            .zip(self.window.iter())
        {
            *input = sample * weight;
        }

        let fft = &mut self.fft;
        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let tau = self.options.smoothing;
        let range = self.options.max_decibels - self.options.min_decibels;
        let scale = 255.0 / range;

        for (index, (smoothed, bin)) in self
            .smoothed
            .iter_mut()
            .zip(self.fft.spectrum.iter())
            .enumerate()
        {
            let magnitude = bin.norm() / size as f32;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;

            if let Some(slot) = out.get_mut(index) {
                let decibels = if *smoothed > 0.0 {
                    20.0 * smoothed.log10()
                } else {
                    f32::NEG_INFINITY
                };
                *slot = (scale * (decibels - self.options.min_decibels)).clamp(0.0, 255.0)
                    as u8;
            }
        }

        Ok(())
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
    samples: Vec<f32>,
}

impl fmt::Debug for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser")
            .field("options", &self.options)
            .field("bins", &self.smoothed.len())
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    let alpha = 0.16;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    let phase = 2.0 * PI * index as f32 / len as f32;
    a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq_bin: usize, size: usize, amplitude: f32) -> Vec<f32> {
        (0..size)
            .map(|i| amplitude * (2.0 * PI * freq_bin as f32 * i as f32 / size as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_midpoint_and_floor() {
        let mut analyser = Analyser::new(AnalyserOptions::default()).unwrap();
        let feed = SampleFeed::new(1024);
        feed.push_samples(&vec![0.0; 512]).unwrap();

        let mut time = vec![0u8; 256];
        let mut freq = vec![7u8; 256];
        analyser.snapshot(&feed, &mut time, &mut freq).unwrap();

        assert!(time.iter().all(|&v| v == 128));
        assert!(freq.iter().all(|&v| v == 0));
    }

    #[test]
    fn time_domain_saturates_at_full_scale() {
        let mut analyser = Analyser::new(AnalyserOptions::with_fft_size(64)).unwrap();
        let feed = SampleFeed::new(64);
        feed.push_samples(&[1.5; 64]).unwrap();

        let mut time = vec![0u8; 32];
        let mut freq = vec![0u8; 32];
        analyser.snapshot(&feed, &mut time, &mut freq).unwrap();
        assert!(time.iter().all(|&v| v == 255));
    }

    #[test]
    fn tone_peaks_in_its_bin() {
        let mut analyser = Analyser::new(AnalyserOptions {
            smoothing: 0.0,
            ..AnalyserOptions::default()
        })
        .unwrap();
        let feed = SampleFeed::new(512);
        feed.push_samples(&sine(40, 512, 0.05)).unwrap();

        let mut time = vec![0u8; 256];
        let mut freq = vec![0u8; 256];
        analyser.snapshot(&feed, &mut time, &mut freq).unwrap();

        let peak = freq
            .iter()
            .enumerate()
            .max_by_key(|(_, value)| **value)
            .map(|(index, _)| index)
            .unwrap();
        assert_eq!(peak, 40);
        assert!(freq[40] > freq[120]);
    }

    #[test]
    fn smoothing_lags_behind_sudden_silence() {
        let mut analyser = Analyser::new(AnalyserOptions::default()).unwrap();
        let feed = SampleFeed::new(512);
        feed.push_samples(&sine(20, 512, 0.05)).unwrap();

        let mut time = vec![0u8; 256];
        let mut loud = vec![0u8; 256];
        analyser.snapshot(&feed, &mut time, &mut loud).unwrap();

        feed.push_samples(&vec![0.0; 512]).unwrap();
        let mut quiet = vec![0u8; 256];
        analyser.snapshot(&feed, &mut time, &mut quiet).unwrap();

        assert!(quiet[20] > 0);
        assert!(quiet[20] < loud[20]);
    }

    #[test]
    fn rejects_invalid_sizes() {
        assert!(Analyser::new(AnalyserOptions::with_fft_size(300)).is_err());
        assert!(Analyser::new(AnalyserOptions::with_fft_size(16)).is_err());
    }
}
