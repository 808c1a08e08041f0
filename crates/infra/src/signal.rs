//! Test-signal sources for live playback and offline rendering

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

/// Waveform produced by a [`ToneGenerator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    #[default]
    Sine,
    /// White noise, useful for hearing the whole curve at once
    Noise,
    /// A single unit sample followed by silence
    Impulse,
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sine" => Ok(SignalKind::Sine),
            "noise" => Ok(SignalKind::Noise),
            "impulse" => Ok(SignalKind::Impulse),
            other => Err(format!("unknown signal kind: {other}")),
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignalKind::Sine => "sine",
            SignalKind::Noise => "noise",
            SignalKind::Impulse => "impulse",
        })
    }
}

/// Allocation-free mono signal source, safe to run in the audio callback
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    kind: SignalKind,
    frequency: f64,
    amplitude: f32,
    sample_rate: f64,
    phase: f64,
    rng: SmallRng,
    position: u64,
}

/// Fixed so renders of the same settings are reproducible
const NOISE_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

impl ToneGenerator {
    pub fn new(kind: SignalKind, frequency: f64, amplitude: f32, sample_rate: f64) -> Self {
        Self {
            kind,
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            sample_rate,
            phase: 0.0,
            rng: SmallRng::seed_from_u64(NOISE_SEED),
            position: 0,
        }
    }

    pub fn sine(frequency: f64, amplitude: f32, sample_rate: f64) -> Self {
        Self::new(SignalKind::Sine, frequency, amplitude, sample_rate)
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Change the rate without disturbing the current phase
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let value = match self.kind {
            SignalKind::Sine => {
                let value = (self.phase * TAU).sin() as f32;
                self.phase = (self.phase + self.frequency / self.sample_rate).fract();
                value
            }
            SignalKind::Noise => self.rng.gen_range(-1.0..=1.0),
            SignalKind::Impulse => {
                if self.position == 0 {
                    1.0
                } else {
                    0.0
                }
            }
        };
        self.position += 1;
        value * self.amplitude
    }

    /// Overwrite `buffer` with the next samples
    pub fn fill(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample();
        }
    }

    /// Samples produced so far
    pub fn position(&self) -> u64 {
        self.position
    }
}
