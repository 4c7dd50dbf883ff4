//! FFT processing for diagnostic spectra

use std::sync::Arc;

use rustfft::{Fft, FftPlanner};

use crate::domain::Sample;

/// Complex spectrum tap: windowed FFT, DC-centred power in dB
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
}

impl FftProcessor {
    /// Create a new FFT processor with the given size
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Hanning window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let x = std::f32::consts::PI * i as f32 / fft_size as f32;
                0.5 * (1.0 - (2.0 * x).cos())
            })
            .collect();

        Self {
            fft,
            fft_size,
            window,
        }
    }

    /// Power spectrum in dB, bins ordered from -fs/2 to +fs/2.
    /// Shorter input is zero padded.
    pub fn compute(&mut self, samples: &[Sample]) -> Vec<f32> {
        let mut buffer: Vec<Sample> = samples
            .iter()
            .take(self.fft_size)
            .zip(self.window.iter())
            .map(|(&s, &w)| s * w)
            .collect();
        buffer.resize(self.fft_size, Sample::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        // Negative frequencies first
        buffer.rotate_right(self.fft_size / 2);
        buffer
            .iter()
            .map(|c| 10.0 * c.norm_sqr().max(1e-10).log10())
            .collect()
    }

    /// Frequency of the strongest bin, in the units of `sample_rate`
    pub fn peak_frequency(&mut self, samples: &[Sample], sample_rate: f64) -> f64 {
        let spectrum = self.compute(samples);
        let peak = spectrum
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
            .0;
        (peak as f64 - (self.fft_size / 2) as f64) * sample_rate / self.fft_size as f64
    }

    /// Get the FFT size
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, sample_rate: f64, n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate;
                Sample::new(phase.cos() as f32, phase.sin() as f32)
            })
            .collect()
    }

    #[test]
    fn negative_and_positive_tones_land_on_their_side() {
        let mut processor = FftProcessor::new(1024);
        let up = processor.peak_frequency(&tone(100_000.0, 1e6, 1024), 1e6);
        let down = processor.peak_frequency(&tone(-250_000.0, 1e6, 1024), 1e6);
        let bin = 1e6 / 1024.0;
        assert!((up - 100_000.0).abs() <= bin, "peak at {up}");
        assert!((down + 250_000.0).abs() <= bin, "peak at {down}");
    }

    #[test]
    fn dc_sits_in_the_middle_bin() {
        let mut processor = FftProcessor::new(256);
        let spectrum = processor.compute(&vec![Sample::new(1.0, 0.0); 256]);
        assert_eq!(spectrum.len(), 256);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 128);
    }

    #[test]
    fn compute_repeated_calls_give_identical_results() {
        let mut processor = FftProcessor::new(512);
        let samples = tone(1000.0, 48000.0, 300);
        let first = processor.compute(&samples);
        let second = processor.compute(&samples);
        assert_eq!(first, second);
    }
}
