use rustfft::{num_complex::Complex64, FftPlanner};
use crate::types::Channel;
/// Magnitude spectrum of one channel.
#[derive(Clone, Debug)]
pub struct ChannelSpectrum {
    pub channel: Channel,
    pub sample_rate_hz: f64,
    pub frequencies_hz: Vec<f64>,
    pub magnitudes: Vec<f64>,
}
impl ChannelSpectrum {
    /// Frequency of the strongest bin, DC excluded.
    pub fn peak_frequency_hz(&self) -> Option<f64> {
        self.magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| self.frequencies_hz[i])
    }
}
/// Helper that computes FFTs for a given window size.
pub struct SpectrumBuilder {
    fft_size: usize,
}
impl SpectrumBuilder {
    pub fn with_size(fft_size: usize) -> Self {
        Self {
            fft_size: fft_size.max(2),
        }
    }
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
    /// Uses the most recent `fft_size` samples, zero-padding shorter series.
    pub fn compute(&self, channel: Channel, samples: &[f64], sample_rate_hz: f64) -> ChannelSpectrum {
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(self.fft_size);
        let frequencies_hz = (0..self.fft_size / 2)
            .map(|k| k as f64 * (sample_rate_hz / self.fft_size as f64))
            .collect();
        let start = samples.len().saturating_sub(self.fft_size);
        let mut buffer: Vec<Complex64> = samples[start..]
            .iter()
            .map(|&v| Complex64::new(v, 0.0))
            .collect();
        buffer.resize(self.fft_size, Complex64::new(0.0, 0.0));
        fft.process(&mut buffer);
        let magnitudes = buffer
            .iter()
            .take(self.fft_size / 2)
            .map(|c| c.norm() / self.fft_size as f64)
            .collect();
        ChannelSpectrum {
            channel,
            sample_rate_hz,
            frequencies_hz,
            magnitudes,
        }
    }
}
