//! Biquad coefficients and the designer that derives them from parameters
//!
//! Design and coefficients stay in `f64`: rounding them to `f32` can push a
//! pole near Nyquist onto the unit circle. Every function here is pure and
//! allocation-free, so the audio thread may call it every block.

use super::db_to_gain;
use crate::domain::params::{ChainSettings, Slope, FREQ_MIN, QUALITY_MIN};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Maximum number of second-order sections in one cut filter (48 dB/oct)
pub const MAX_SECTIONS: usize = 4;

/// Biquad filter coefficients
///
/// Direct Form I layout, `a0` normalised to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f64,
    pub a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Peaking EQ (bell) around `freq`
    ///
    /// # Parameters
    /// - `sample_rate`: Audio sample rate in Hz
    /// - `freq`: Center frequency in Hz, must be below Nyquist
    /// - `q`: Quality factor, must be positive
    /// - `gain`: Linear gain at the center frequency
    #[must_use]
    pub fn peaking(sample_rate: f64, freq: f64, q: f64, gain: f64) -> Self {
        let a = gain.sqrt();
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        )
    }

    /// Second-order high-pass with resonance `q` at `freq`
    #[must_use]
    pub fn highpass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        Self::normalized(
            (1.0 + cos_w0) / 2.0,
            -(1.0 + cos_w0),
            (1.0 + cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    /// Second-order low-pass with resonance `q` at `freq`
    #[must_use]
    pub fn lowpass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        Self::normalized(
            (1.0 - cos_w0) / 2.0,
            1.0 - cos_w0,
            (1.0 - cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    /// Complex frequency response at `freq` Hz
    pub fn response(&self, freq: f64, sample_rate: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -2.0 * PI * freq / sample_rate);
        let z2 = z1 * z1;
        let num = self.b0 + z1 * self.b1 + z2 * self.b2;
        let den = 1.0 + z1 * self.a1 + z2 * self.a2;
        num / den
    }

    /// Linear magnitude at `freq` Hz
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        self.response(freq, sample_rate).norm()
    }

    /// Both poles strictly inside the unit circle
    pub fn is_stable(&self) -> bool {
        self.a2.abs() < 1.0 && self.a1.abs() < 1.0 + self.a2
    }
}

/// One to four coefficient sets describing a filter role
///
/// Fixed capacity; `len` says how many sections are meaningful.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoefficientSet {
    sections: [BiquadCoeffs; MAX_SECTIONS],
    len: usize,
}

impl CoefficientSet {
    /// Set holding exactly one section
    pub fn single(coeffs: BiquadCoeffs) -> Self {
        Self::from_fn(1, |_| coeffs)
    }

    fn from_fn(len: usize, mut f: impl FnMut(usize) -> BiquadCoeffs) -> Self {
        assert!(
            (1..=MAX_SECTIONS).contains(&len),
            "coefficient set length out of range: {len}"
        );
        let mut sections = [BiquadCoeffs::default(); MAX_SECTIONS];
        for (i, section) in sections.iter_mut().take(len).enumerate() {
            *section = f(i);
        }
        Self { sections, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[BiquadCoeffs] {
        &self.sections[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BiquadCoeffs> {
        self.as_slice().iter()
    }

    /// Combined linear magnitude of all sections in series
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        self.iter().map(|c| c.magnitude(freq, sample_rate)).product()
    }
}

impl<'a> IntoIterator for &'a CoefficientSet {
    type Item = &'a BiquadCoeffs;
    type IntoIter = std::slice::Iter<'a, BiquadCoeffs>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Clamp a design frequency into `[20 Hz, Nyquist - 1 Hz]`
///
/// Designing at or above Nyquist would produce unstable coefficients, so this
/// correction is silent rather than an error.
pub fn clamp_frequency(freq: f32, sample_rate: f64) -> f64 {
    let low = FREQ_MIN as f64;
    let high = (sample_rate / 2.0 - 1.0).max(low);
    let freq = freq as f64;
    if freq.is_nan() {
        return low;
    }
    freq.clamp(low, high)
}

/// Q of section `section` in a Butterworth filter of even order `order`
///
/// Poles sit at angles `(2k + 1)·π / (2·order)` from the negative real axis.
pub fn butterworth_q(section: usize, order: usize) -> f64 {
    debug_assert!(order % 2 == 0 && section < order / 2);
    let angle = (2 * section + 1) as f64 * PI / (2 * order) as f64;
    1.0 / (2.0 * angle.cos())
}

/// Peaking filter for the bell stage; `gain_db` is converted to linear gain
pub fn design_peak(freq: f32, q: f32, gain_db: f32, sample_rate: f64) -> CoefficientSet {
    let freq = clamp_frequency(freq, sample_rate);
    let q = (q as f64).max(QUALITY_MIN as f64);
    let gain = db_to_gain(gain_db as f64);
    CoefficientSet::single(BiquadCoeffs::peaking(sample_rate, freq, q, gain))
}

/// Butterworth high-pass split into `slope.sections()` biquads
pub fn design_low_cut(freq: f32, slope: Slope, sample_rate: f64) -> CoefficientSet {
    let freq = clamp_frequency(freq, sample_rate);
    CoefficientSet::from_fn(slope.sections(), |k| {
        BiquadCoeffs::highpass(sample_rate, freq, butterworth_q(k, slope.order()))
    })
}

/// Butterworth low-pass split into `slope.sections()` biquads
pub fn design_high_cut(freq: f32, slope: Slope, sample_rate: f64) -> CoefficientSet {
    let freq = clamp_frequency(freq, sample_rate);
    CoefficientSet::from_fn(slope.sections(), |k| {
        BiquadCoeffs::lowpass(sample_rate, freq, butterworth_q(k, slope.order()))
    })
}

/// Coefficients for all three filter roles, designed from one snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainCoefficients {
    pub low_cut: CoefficientSet,
    pub low_cut_slope: Slope,
    pub peak: CoefficientSet,
    pub high_cut: CoefficientSet,
    pub high_cut_slope: Slope,
}

impl ChainCoefficients {
    pub fn design(settings: &ChainSettings, sample_rate: f64) -> Self {
        Self {
            low_cut: design_low_cut(settings.low_cut_freq, settings.low_cut_slope, sample_rate),
            low_cut_slope: settings.low_cut_slope,
            peak: design_peak(
                settings.peak_freq,
                settings.peak_quality,
                settings.peak_gain_db,
                sample_rate,
            ),
            high_cut: design_high_cut(settings.high_cut_freq, settings.high_cut_slope, sample_rate),
            high_cut_slope: settings.high_cut_slope,
        }
    }
}
