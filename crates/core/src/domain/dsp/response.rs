//! Magnitude-response sampling for the editor's curve
//!
//! The monitor keeps its own mono [`FilterChain`], so drawing never touches
//! the chains the audio thread is running.

use std::sync::Arc;

use tracing::trace;

use super::chain::FilterChain;
use super::gain_to_db;
use super::processor::UpdateCoordinator;
use crate::domain::params::{ParameterStore, FREQ_MAX, FREQ_MIN};

/// Map a normalized position in `[0, 1]` onto a log scale over `[min, max]`
pub fn map_to_log10(proportion: f64, min: f64, max: f64) -> f64 {
    min * (max / min).powf(proportion)
}

/// Magnitude response sampled at log-spaced frequencies between 20 Hz and 20 kHz
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCurve {
    frequencies: Vec<f64>,
    magnitudes_db: Vec<f64>,
}

impl ResponseCurve {
    /// Flat curve with `points` samples
    pub fn new(points: usize) -> Self {
        let (min, max) = (FREQ_MIN as f64, FREQ_MAX as f64);
        let frequencies = match points {
            0 => Vec::new(),
            1 => vec![min],
            n => (0..n)
                .map(|i| map_to_log10(i as f64 / (n - 1) as f64, min, max))
                .collect(),
        };
        Self {
            magnitudes_db: vec![0.0; frequencies.len()],
            frequencies,
        }
    }

    /// Re-sample `chain` at every frequency of the curve
    pub fn compute(&mut self, chain: &FilterChain, sample_rate: f64) {
        for (freq, db) in self.frequencies.iter().zip(self.magnitudes_db.iter_mut()) {
            *db = gain_to_db(chain.magnitude_response(*freq, sample_rate));
        }
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn magnitudes_db(&self) -> &[f64] {
        &self.magnitudes_db
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// `(frequency, dB)` pairs in ascending frequency
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.frequencies
            .iter()
            .copied()
            .zip(self.magnitudes_db.iter().copied())
    }

    /// Loudest point of the curve
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.points().max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Timer-driven view of the equalizer's frequency response
///
/// Call [`poll`](Self::poll) on the UI cadence. It consumes the store's
/// changed flag and only recomputes when something moved.
pub struct ResponseMonitor {
    params: Arc<ParameterStore>,
    chain: FilterChain,
    coordinator: UpdateCoordinator,
    curve: ResponseCurve,
}

impl ResponseMonitor {
    pub fn new(params: Arc<ParameterStore>, sample_rate: f64, points: usize) -> Self {
        let mut monitor = Self {
            params,
            chain: FilterChain::new(),
            coordinator: UpdateCoordinator::new(sample_rate),
            curve: ResponseCurve::new(points),
        };
        monitor.refresh();
        monitor
    }

    /// Recompute if parameters changed since the last poll
    pub fn poll(&mut self) -> bool {
        if self.params.take_changed() {
            self.refresh();
            true
        } else {
            false
        }
    }

    /// Recompute from a fresh snapshot regardless of the changed flag
    pub fn refresh(&mut self) {
        let settings = self.params.snapshot();
        self.coordinator
            .apply(&settings, std::slice::from_mut(&mut self.chain));
        self.curve.compute(&self.chain, self.coordinator.sample_rate());
        trace!(points = self.curve.len(), "Response curve refreshed");
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.coordinator.set_sample_rate(sample_rate);
        self.refresh();
    }

    pub fn curve(&self) -> &ResponseCurve {
        &self.curve
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    pub fn sample_rate(&self) -> f64 {
        self.coordinator.sample_rate()
    }
}
