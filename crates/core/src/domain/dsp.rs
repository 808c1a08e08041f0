//! Digital Signal Processing for the three-stage equalizer
//!
//! Signal path, per channel:
//! - Low-cut: 1–4 cascaded Butterworth high-pass sections
//! - Peak: one peaking (bell) biquad
//! - High-cut: 1–4 cascaded Butterworth low-pass sections
//!
//! Everything reachable from [`StereoProcessor::process_block`] is designed
//! for the audio thread:
//! - Zero allocations in the hot path
//! - No locks, no logging
//! - Fixed-size stage arrays; topology changes only flip bypass flags

pub mod biquad;
pub mod chain;
pub mod processor;
pub mod response;
pub mod stage;

pub use biquad::{
    butterworth_q, clamp_frequency, design_high_cut, design_low_cut, design_peak, BiquadCoeffs,
    ChainCoefficients, CoefficientSet, MAX_SECTIONS,
};
pub use chain::{ChainPosition, CutFilter, CutKind, FilterChain, MAX_CUT_STAGES};
pub use processor::{Channel, StereoProcessor, UpdateCoordinator};
pub use response::{map_to_log10, ResponseCurve, ResponseMonitor};
pub use stage::CascadeStage;

use crate::domain::audio::AudioError;

/// Floor used when converting silence to decibels
pub const MIN_DB: f64 = -100.0;

/// Core trait for all audio effects
///
/// All effects process audio in-place on f32 buffers normalized to [-1.0, 1.0].
pub trait Effect: Send + Sync {
    /// Process a buffer of audio samples in-place
    ///
    /// # Requirements
    /// - No allocations in the hot path
    /// - Handle buffer of any size
    fn process(&mut self, buffer: &mut [f32]) -> Result<(), AudioError>;

    /// Reset effect state to initial conditions
    ///
    /// Clears filter memory, e.g. on transport stop.
    fn reset(&mut self);

    /// Check if effect is bypassed (zero processing overhead when true)
    fn is_bypassed(&self) -> bool;

    /// Toggle bypass state
    fn set_bypass(&mut self, bypass: bool);

    /// Get effect name for debugging/display
    fn name(&self) -> &str;
}

/// Convert decibels to a linear amplitude factor
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert a linear amplitude factor to decibels, floored at [`MIN_DB`]
#[inline]
pub fn gain_to_db(gain: f64) -> f64 {
    if gain > 0.0 {
        (20.0 * gain.log10()).max(MIN_DB)
    } else {
        MIN_DB
    }
}
