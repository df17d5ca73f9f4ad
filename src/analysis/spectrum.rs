//! Real-input magnitude spectrum via rustfft.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Forward-transform helper that caches plans across chunks.
///
/// Chunk sizes are fixed in steady state, so the planner's cache makes every
/// call after the first cheap.
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f32>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            scratch: Vec::new(),
        }
    }

    /// Magnitude spectrum of a real input: the first ⌊n/2⌋+1 bins of the
    /// forward transform, one float per frequency bin.
    pub fn magnitudes(&mut self, samples: &[f32]) -> Vec<f32> {
        if samples.is_empty() {
            return Vec::new();
        }
        let fft: Arc<dyn Fft<f32>> = self.planner.plan_fft_forward(samples.len());
        self.scratch.clear();
        self.scratch
            .extend(samples.iter().map(|&s| Complex::new(s, 0.0)));
        fft.process(&mut self.scratch);
        self.scratch
            .iter()
            .take(samples.len() / 2 + 1)
            .map(|c| c.norm())
            .collect()
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the bin with the largest magnitude, if any.
pub fn dominant_bin(magnitudes: &[f32]) -> Option<usize> {
    magnitudes
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(idx, _)| idx)
}

/// Center frequency in Hz of a bin for an n-sample transform.
pub fn bin_frequency(bin: usize, n_samples: usize, sample_rate: u32) -> f32 {
    if n_samples == 0 {
        return 0.0;
    }
    bin as f32 * sample_rate as f32 / n_samples as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn spectrum_length_is_half_plus_one() {
        let mut analyzer = SpectrumAnalyzer::new();
        assert_eq!(analyzer.magnitudes(&vec![0.0; 1024]).len(), 513);
        assert_eq!(analyzer.magnitudes(&vec![0.0; 1000]).len(), 501);
    }

    #[test]
    fn empty_input_yields_empty_spectrum() {
        let mut analyzer = SpectrumAnalyzer::new();
        assert!(analyzer.magnitudes(&[]).is_empty());
    }

    #[test]
    fn sine_peak_lands_within_one_bin_of_its_frequency() {
        let sample_rate = 16_000;
        let samples = sine(440.0, sample_rate, 16_000);
        let mut analyzer = SpectrumAnalyzer::new();
        let mags = analyzer.magnitudes(&samples);
        let peak = dominant_bin(&mags).unwrap();
        let peak_freq = bin_frequency(peak, samples.len(), sample_rate);
        // 16 000-sample transform at 16 kHz → 1 Hz bin resolution.
        assert!(
            (peak_freq - 440.0).abs() <= 1.0,
            "peak at {peak_freq} Hz, expected ≈440 Hz"
        );
    }

    #[test]
    fn dc_signal_peaks_at_bin_zero() {
        let mut analyzer = SpectrumAnalyzer::new();
        let mags = analyzer.magnitudes(&vec![0.5; 512]);
        assert_eq!(dominant_bin(&mags), Some(0));
        assert_relative_eq!(mags[0], 256.0, epsilon = 1e-3);
    }

    #[test]
    fn bin_frequency_scales_linearly() {
        assert_relative_eq!(bin_frequency(0, 1024, 16_000), 0.0);
        assert_relative_eq!(bin_frequency(32, 1024, 16_000), 500.0);
        assert_eq!(bin_frequency(1, 0, 16_000), 0.0);
    }
}
