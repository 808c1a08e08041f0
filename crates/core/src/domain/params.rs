//! Parameter surface of the equalizer
//!
//! Seven controls drive the filter chain. The control thread writes them into
//! a [`ParameterStore`]; the audio thread reads one [`ChainSettings`] snapshot
//! per block. Values travel as `f32` bits in cache-padded atomics, so neither
//! side ever blocks the other.

use crossbeam::utils::CachePadded;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use thiserror::Error;
use tracing::trace;

pub type Result<T> = std::result::Result<T, ParameterError>;

/// Errors raised when parsing parameter names or values from the outside world
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Unsupported slope: {0} dB/oct (expected 12, 24, 36 or 48)")]
    InvalidSlope(u32),
}

/// Frequency range shared by all three filter roles (Hz)
pub const FREQ_MIN: f32 = 20.0;
pub const FREQ_MAX: f32 = 20000.0;

/// Peak gain range (dB)
pub const GAIN_MIN_DB: f32 = -24.0;
pub const GAIN_MAX_DB: f32 = 24.0;

/// Peak quality range
pub const QUALITY_MIN: f32 = 0.1;
pub const QUALITY_MAX: f32 = 10.0;

/// Number of user-facing controls
pub const PARAMETER_COUNT: usize = 7;

/// Rolloff steepness of a cut filter
///
/// Each step adds one Butterworth second-order section (12 dB/oct).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Slope {
    #[default]
    Db12,
    Db24,
    Db36,
    Db48,
}

impl Slope {
    pub const ALL: [Slope; 4] = [Slope::Db12, Slope::Db24, Slope::Db36, Slope::Db48];

    /// Slope for a choice index in `0..=3`
    ///
    /// # Panics
    /// Panics on any other index. Parameter storage clamps choice values, so
    /// reaching this is a programming error.
    pub fn from_index(index: usize) -> Self {
        assert!(index < Self::ALL.len(), "slope index out of range: {index}");
        Self::ALL[index]
    }

    pub fn index(self) -> usize {
        match self {
            Slope::Db12 => 0,
            Slope::Db24 => 1,
            Slope::Db36 => 2,
            Slope::Db48 => 3,
        }
    }

    /// Number of cascaded second-order sections
    pub fn sections(self) -> usize {
        self.index() + 1
    }

    /// Overall Butterworth filter order
    pub fn order(self) -> usize {
        2 * self.sections()
    }

    pub fn db_per_octave(self) -> u32 {
        12 * self.sections() as u32
    }
}

impl TryFrom<u32> for Slope {
    type Error = ParameterError;

    fn try_from(db_per_octave: u32) -> Result<Self> {
        Slope::ALL
            .into_iter()
            .find(|slope| slope.db_per_octave() == db_per_octave)
            .ok_or(ParameterError::InvalidSlope(db_per_octave))
    }
}

impl From<Slope> for u32 {
    fn from(slope: Slope) -> Self {
        slope.db_per_octave()
    }
}

impl fmt::Display for Slope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} dB/oct", self.db_per_octave())
    }
}

/// Valid range and default of one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParameterRange {
    /// Clamp into range; NaN falls back to the default
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

/// Identifier of a user-facing control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterId {
    LowCutFreq,
    HighCutFreq,
    PeakFreq,
    PeakGain,
    PeakQuality,
    LowCutSlope,
    HighCutSlope,
}

impl ParameterId {
    pub const ALL: [ParameterId; PARAMETER_COUNT] = [
        ParameterId::LowCutFreq,
        ParameterId::HighCutFreq,
        ParameterId::PeakFreq,
        ParameterId::PeakGain,
        ParameterId::PeakQuality,
        ParameterId::LowCutSlope,
        ParameterId::HighCutSlope,
    ];

    /// Display name, also the key the host persists the value under
    pub fn name(self) -> &'static str {
        match self {
            ParameterId::LowCutFreq => "LowCut Freq",
            ParameterId::HighCutFreq => "HighCut Freq",
            ParameterId::PeakFreq => "Peak Freq",
            ParameterId::PeakGain => "Peak Gain",
            ParameterId::PeakQuality => "Peak Quality",
            ParameterId::LowCutSlope => "LowCut Slope",
            ParameterId::HighCutSlope => "HighCut Slope",
        }
    }

    /// Slot in [`ParameterStore`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_choice(self) -> bool {
        matches!(self, ParameterId::LowCutSlope | ParameterId::HighCutSlope)
    }

    pub fn range(self) -> ParameterRange {
        match self {
            ParameterId::LowCutFreq => ParameterRange {
                min: FREQ_MIN,
                max: FREQ_MAX,
                default: FREQ_MIN,
            },
            ParameterId::HighCutFreq => ParameterRange {
                min: FREQ_MIN,
                max: FREQ_MAX,
                default: FREQ_MAX,
            },
            ParameterId::PeakFreq => ParameterRange {
                min: FREQ_MIN,
                max: FREQ_MAX,
                default: 1000.0,
            },
            ParameterId::PeakGain => ParameterRange {
                min: GAIN_MIN_DB,
                max: GAIN_MAX_DB,
                default: 0.0,
            },
            ParameterId::PeakQuality => ParameterRange {
                min: QUALITY_MIN,
                max: QUALITY_MAX,
                default: 1.0,
            },
            // Choice parameters hold the slope index
            ParameterId::LowCutSlope | ParameterId::HighCutSlope => ParameterRange {
                min: 0.0,
                max: (Slope::ALL.len() - 1) as f32,
                default: 0.0,
            },
        }
    }

    /// Clamp a raw value for this parameter; choice values snap to an index
    pub fn sanitize(self, value: f32) -> f32 {
        let clamped = self.range().clamp(value);
        if self.is_choice() {
            clamped.round()
        } else {
            clamped
        }
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParameterId {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        ParameterId::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParameterError::UnknownParameter(s.to_string()))
    }
}

/// Snapshot of every control, taken once per audio block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    pub low_cut_freq: f32,
    pub high_cut_freq: f32,
    pub peak_freq: f32,
    pub peak_gain_db: f32,
    pub peak_quality: f32,
    pub low_cut_slope: Slope,
    pub high_cut_slope: Slope,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            low_cut_freq: ParameterId::LowCutFreq.range().default,
            high_cut_freq: ParameterId::HighCutFreq.range().default,
            peak_freq: ParameterId::PeakFreq.range().default,
            peak_gain_db: ParameterId::PeakGain.range().default,
            peak_quality: ParameterId::PeakQuality.range().default,
            low_cut_slope: Slope::default(),
            high_cut_slope: Slope::default(),
        }
    }
}

impl ChainSettings {
    /// Raw value of one control, slopes as their choice index
    pub fn value(&self, id: ParameterId) -> f32 {
        match id {
            ParameterId::LowCutFreq => self.low_cut_freq,
            ParameterId::HighCutFreq => self.high_cut_freq,
            ParameterId::PeakFreq => self.peak_freq,
            ParameterId::PeakGain => self.peak_gain_db,
            ParameterId::PeakQuality => self.peak_quality,
            ParameterId::LowCutSlope => self.low_cut_slope.index() as f32,
            ParameterId::HighCutSlope => self.high_cut_slope.index() as f32,
        }
    }

    /// Set one control, clamping it into its range
    pub fn set_value(&mut self, id: ParameterId, value: f32) {
        let value = id.sanitize(value);
        match id {
            ParameterId::LowCutFreq => self.low_cut_freq = value,
            ParameterId::HighCutFreq => self.high_cut_freq = value,
            ParameterId::PeakFreq => self.peak_freq = value,
            ParameterId::PeakGain => self.peak_gain_db = value,
            ParameterId::PeakQuality => self.peak_quality = value,
            ParameterId::LowCutSlope => self.low_cut_slope = Slope::from_index(value as usize),
            ParameterId::HighCutSlope => self.high_cut_slope = Slope::from_index(value as usize),
        }
    }

    /// Copy with every continuous value forced into range
    #[must_use]
    pub fn clamped(mut self) -> Self {
        for id in ParameterId::ALL {
            if !id.is_choice() {
                self.set_value(id, self.value(id));
            }
        }
        self
    }
}

/// Lock-free parameter storage shared between control and audio threads
///
/// One writer (control thread) and one reader per consumer. The `changed`
/// flag is the editor's "something moved" signal: raised on every write,
/// consumed by whoever redraws the response curve.
pub struct ParameterStore {
    values: [CachePadded<AtomicU32>; PARAMETER_COUNT],
    changed: CachePadded<AtomicBool>,
}

impl ParameterStore {
    /// Store holding the default value of every parameter
    pub fn new() -> Self {
        Self::from_settings(&ChainSettings::default())
    }

    pub fn from_settings(settings: &ChainSettings) -> Self {
        let settings = settings.clamped();
        Self {
            values: std::array::from_fn(|i| {
                CachePadded::new(AtomicU32::new(settings.value(ParameterId::ALL[i]).to_bits()))
            }),
            changed: CachePadded::new(AtomicBool::new(true)),
        }
    }

    /// Write one parameter; returns the value actually stored after clamping
    pub fn set(&self, id: ParameterId, value: f32) -> f32 {
        let value = id.sanitize(value);
        self.values[id.index()].store(value.to_bits(), Ordering::Relaxed);
        self.changed.store(true, Ordering::Release);
        trace!(parameter = %id, value, "Parameter updated");
        value
    }

    pub fn get(&self, id: ParameterId) -> f32 {
        f32::from_bits(self.values[id.index()].load(Ordering::Relaxed))
    }

    /// Replace every parameter, e.g. after a preset load or state restore
    pub fn store_settings(&self, settings: &ChainSettings) {
        for id in ParameterId::ALL {
            let value = id.sanitize(settings.value(id));
            self.values[id.index()].store(value.to_bits(), Ordering::Relaxed);
        }
        self.changed.store(true, Ordering::Release);
    }

    pub fn reset_to_defaults(&self) {
        self.store_settings(&ChainSettings::default());
    }

    /// Read every parameter into a settings snapshot
    pub fn snapshot(&self) -> ChainSettings {
        ChainSettings {
            low_cut_freq: self.get(ParameterId::LowCutFreq),
            high_cut_freq: self.get(ParameterId::HighCutFreq),
            peak_freq: self.get(ParameterId::PeakFreq),
            peak_gain_db: self.get(ParameterId::PeakGain),
            peak_quality: self.get(ParameterId::PeakQuality),
            low_cut_slope: Slope::from_index(self.get(ParameterId::LowCutSlope) as usize),
            high_cut_slope: Slope::from_index(self.get(ParameterId::HighCutSlope) as usize),
        }
    }

    /// Consume the changed flag; true if anything was written since last call
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterStore")
            .field("settings", &self.snapshot())
            .field("changed", &self.is_changed())
            .finish()
    }
}
