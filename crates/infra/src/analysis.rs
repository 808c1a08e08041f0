//! Measured frequency response
//!
//! Pushes a unit impulse through a real [`StereoProcessor`] and takes the FFT
//! of what comes out. Comparing this with the analytic response catches
//! mistakes in the sample path that the coefficient math alone would miss.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use tracing::debug;

use bellcut_core::domain::audio::{AudioError, ProcessSpec, Result};
use bellcut_core::domain::dsp::{gain_to_db, StereoProcessor};
use bellcut_core::domain::params::{ChainSettings, ParameterStore};

/// Magnitude spectrum of the equalizer's impulse response
#[derive(Debug, Clone)]
pub struct MeasuredResponse {
    sample_rate: f64,
    fft_size: usize,
    magnitudes: Vec<f64>,
}

impl MeasuredResponse {
    /// Measure `settings` at `sample_rate` with an `fft_size`-point transform
    ///
    /// The impulse response is truncated to `fft_size` samples, so very low
    /// cutoffs with steep slopes need a long transform.
    pub fn measure(settings: &ChainSettings, sample_rate: f64, fft_size: usize) -> Result<Self> {
        if fft_size < 2 {
            return Err(AudioError::InvalidConfiguration(format!(
                "FFT size must be at least 2, got {fft_size}"
            )));
        }

        let params = Arc::new(ParameterStore::from_settings(settings));
        let mut processor = StereoProcessor::new(params);
        processor.prepare(ProcessSpec {
            sample_rate,
            max_block_size: fft_size,
        })?;

        let mut left = vec![0.0f32; fft_size];
        let mut right = vec![0.0f32; fft_size];
        left[0] = 1.0;
        processor.process_block(&mut left, &mut right);

        let mut buffer: Vec<Complex<f64>> =
            left.iter().map(|&s| Complex::new(s as f64, 0.0)).collect();
        let fft = FftPlanner::<f64>::new().plan_fft_forward(fft_size);
        fft.process(&mut buffer);

        let magnitudes = buffer[..=fft_size / 2].iter().map(|c| c.norm()).collect();
        debug!(fft_size, sample_rate, "Impulse response measured");

        Ok(Self {
            sample_rate,
            fft_size,
            magnitudes,
        })
    }

    /// Centre frequency of FFT bin `bin`
    pub fn bin_frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.sample_rate / self.fft_size as f64
    }

    /// Linear magnitude of the bin nearest to `freq`
    pub fn magnitude_at(&self, freq: f64) -> f64 {
        let bin = (freq * self.fft_size as f64 / self.sample_rate).round() as usize;
        self.magnitudes[bin.min(self.magnitudes.len() - 1)]
    }

    /// `(frequency, dB)` for every bin from DC to Nyquist
    pub fn points_db(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.magnitudes
            .iter()
            .enumerate()
            .map(|(bin, &m)| (self.bin_frequency(bin), gain_to_db(m)))
    }

    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitudes
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}
