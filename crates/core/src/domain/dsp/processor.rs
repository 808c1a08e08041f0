//! Stereo processing and coefficient updates
//!
//! [`StereoProcessor`] owns one [`FilterChain`] per channel and pulls a
//! [`ChainSettings`] snapshot from the shared [`ParameterStore`] at the top
//! of every block. The [`UpdateCoordinator`] turns that snapshot into
//! coefficients and writes the same values into both chains.

use std::sync::Arc;

use tracing::{debug, info};

use super::biquad::ChainCoefficients;
use super::chain::FilterChain;
use super::Effect;
use crate::domain::audio::{AudioError, ProcessSpec};
use crate::domain::params::{ChainSettings, ParameterStore, FREQ_MIN};

/// Lowest sample rate for which `[20 Hz, Nyquist - 1 Hz]` is non-empty
const MIN_SAMPLE_RATE: f64 = 2.0 * (FREQ_MIN as f64 + 1.0);

/// Audio channel of a stereo pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    pub fn index(self) -> usize {
        match self {
            Channel::Left => 0,
            Channel::Right => 1,
        }
    }
}

/// Decides when coefficients must be redesigned and commits them
///
/// Runs on the audio thread: no allocation, no locks, no logging.
#[derive(Debug, Clone)]
pub struct UpdateCoordinator {
    sample_rate: f64,
    last_applied: Option<ChainSettings>,
}

impl UpdateCoordinator {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            last_applied: None,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Change the design sample rate; the next update always recomputes
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.invalidate();
    }

    /// Forget the last-applied snapshot
    pub fn invalidate(&mut self) {
        self.last_applied = None;
    }

    /// Redesign and commit if `settings` differ from what was last applied
    ///
    /// Returns true when new coefficients were written.
    pub fn maybe_update(&mut self, settings: &ChainSettings, chains: &mut [FilterChain]) -> bool {
        if self.last_applied.as_ref() == Some(settings) {
            return false;
        }
        self.apply(settings, chains);
        true
    }

    /// Unconditionally redesign and write identical coefficients to every chain
    pub fn apply(&mut self, settings: &ChainSettings, chains: &mut [FilterChain]) {
        let coeffs = ChainCoefficients::design(settings, self.sample_rate);
        for chain in chains.iter_mut() {
            chain.apply(&coeffs);
        }
        self.last_applied = Some(*settings);
    }

    pub fn last_applied(&self) -> Option<&ChainSettings> {
        self.last_applied.as_ref()
    }
}

/// Two-channel equalizer driven by a shared parameter store
pub struct StereoProcessor {
    params: Arc<ParameterStore>,
    chains: [FilterChain; 2],
    coordinator: UpdateCoordinator,
    spec: ProcessSpec,
    bypass: bool,
}

impl StereoProcessor {
    pub fn new(params: Arc<ParameterStore>) -> Self {
        let spec = ProcessSpec::default();
        Self {
            params,
            chains: [FilterChain::new(), FilterChain::new()],
            coordinator: UpdateCoordinator::new(spec.sample_rate),
            spec,
            bypass: false,
        }
    }

    /// Set up for playback at the host's sample rate
    ///
    /// Clears filter memory and designs coefficients from the current
    /// parameters. Call before the first block and whenever the rate changes.
    pub fn prepare(&mut self, spec: ProcessSpec) -> Result<(), AudioError> {
        if !spec.sample_rate.is_finite() || spec.sample_rate < MIN_SAMPLE_RATE {
            return Err(AudioError::InvalidConfiguration(format!(
                "sample rate must be at least {MIN_SAMPLE_RATE} Hz, got {}",
                spec.sample_rate
            )));
        }
        if spec.max_block_size == 0 {
            return Err(AudioError::InvalidConfiguration(
                "max block size must be non-zero".to_string(),
            ));
        }

        self.spec = spec;
        self.coordinator.set_sample_rate(spec.sample_rate);
        self.reset_chains();

        let settings = self.params.snapshot();
        self.coordinator.apply(&settings, &mut self.chains);

        info!(
            sample_rate = spec.sample_rate,
            max_block_size = spec.max_block_size,
            "Equalizer prepared"
        );
        debug!(?settings, "Initial coefficients designed");
        Ok(())
    }

    /// Filter one block per channel in place
    ///
    /// Reads the parameter store once, then runs both chains.
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        let settings = self.params.snapshot();
        self.process_block_with(&settings, left, right);
    }

    /// Like [`process_block`](Self::process_block) with an explicit snapshot
    pub fn process_block_with(
        &mut self,
        settings: &ChainSettings,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        self.coordinator.maybe_update(settings, &mut self.chains);
        if self.bypass {
            return;
        }

        let [left_chain, right_chain] = &mut self.chains;
        left_chain.process(left);
        right_chain.process(right);
    }

    /// Filter interleaved stereo frames in place
    ///
    /// A trailing sample without a partner goes through the left chain.
    pub fn process_interleaved(&mut self, buffer: &mut [f32]) {
        let settings = self.params.snapshot();
        self.coordinator.maybe_update(&settings, &mut self.chains);
        if self.bypass {
            return;
        }

        let [left_chain, right_chain] = &mut self.chains;
        let mut frames = buffer.chunks_exact_mut(2);
        for frame in &mut frames {
            frame[0] = left_chain.process_sample(frame[0]);
            frame[1] = right_chain.process_sample(frame[1]);
        }
        for sample in frames.into_remainder() {
            *sample = left_chain.process_sample(*sample);
        }
    }

    /// Adopt restored parameter values and re-derive coefficients from them
    pub fn restore(&mut self, settings: &ChainSettings) {
        self.params.store_settings(settings);
        let settings = self.params.snapshot();
        self.coordinator.apply(&settings, &mut self.chains);
        info!("Equalizer state restored");
    }

    pub fn chain(&self, channel: Channel) -> &FilterChain {
        &self.chains[channel.index()]
    }

    pub fn coordinator(&self) -> &UpdateCoordinator {
        &self.coordinator
    }

    /// Linear gain of the left chain at `freq` Hz; both chains are identical
    pub fn magnitude_response(&self, freq: f64) -> f64 {
        self.chains[Channel::Left.index()].magnitude_response(freq, self.spec.sample_rate)
    }

    pub fn sample_rate(&self) -> f64 {
        self.spec.sample_rate
    }

    pub fn spec(&self) -> ProcessSpec {
        self.spec
    }

    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    fn reset_chains(&mut self) {
        self.chains.iter_mut().for_each(FilterChain::reset);
    }
}

impl Effect for StereoProcessor {
    fn process(&mut self, buffer: &mut [f32]) -> Result<(), AudioError> {
        self.process_interleaved(buffer);
        Ok(())
    }

    fn reset(&mut self) {
        self.reset_chains();
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        // Stale memory would click when the filters come back in
        if bypass && !self.bypass {
            self.reset_chains();
        }
        self.bypass = bypass;
    }

    fn name(&self) -> &str {
        "Bellcut EQ"
    }
}
