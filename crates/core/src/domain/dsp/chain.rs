//! Per-channel filter chain: low-cut cascade, peak, high-cut cascade
//!
//! Both cut filters always hold [`MAX_CUT_STAGES`] stages. A slope change
//! only flips bypass flags, so the chain never reallocates or reorders.

use super::biquad::{ChainCoefficients, CoefficientSet, MAX_SECTIONS};
use super::stage::CascadeStage;
use crate::domain::params::Slope;

/// Stages per cut filter
pub const MAX_CUT_STAGES: usize = MAX_SECTIONS;

/// Which cut filter of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CutKind {
    LowCut,
    HighCut,
}

/// Address of one stage inside a [`FilterChain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainPosition {
    LowCut(usize),
    Peak,
    HighCut(usize),
}

impl ChainPosition {
    /// Every position in processing order
    pub fn all() -> impl Iterator<Item = ChainPosition> {
        (0..MAX_CUT_STAGES)
            .map(ChainPosition::LowCut)
            .chain(std::iter::once(ChainPosition::Peak))
            .chain((0..MAX_CUT_STAGES).map(ChainPosition::HighCut))
    }
}

/// Fixed-capacity cascade of Butterworth sections
///
/// Invariant: the first `slope.sections()` stages are enabled, the rest
/// bypassed.
#[derive(Debug, Clone, PartialEq)]
pub struct CutFilter {
    stages: [CascadeStage; MAX_CUT_STAGES],
}

impl CutFilter {
    /// Unity-coefficient cascade with the default slope's topology
    pub fn new() -> Self {
        let mut filter = Self {
            stages: std::array::from_fn(|_| CascadeStage::bypassed()),
        };
        filter.set_topology(Slope::default());
        filter
    }

    /// Enable exactly `slope.sections()` stages, bypass the rest
    pub fn set_topology(&mut self, slope: Slope) {
        let enabled = slope.sections();
        for (i, stage) in self.stages.iter_mut().enumerate() {
            stage.set_bypassed(i >= enabled);
        }
    }

    /// Copy new section coefficients in, then reconcile topology
    pub fn update(&mut self, coeffs: &CoefficientSet, slope: Slope) {
        debug_assert_eq!(coeffs.len(), slope.sections());
        for (stage, section) in self.stages.iter_mut().zip(coeffs) {
            stage.set_coeffs(*section);
        }
        self.set_topology(slope);
    }

    pub fn enabled_count(&self) -> usize {
        self.stages.iter().filter(|s| s.is_enabled()).count()
    }

    pub fn stages(&self) -> &[CascadeStage; MAX_CUT_STAGES] {
        &self.stages
    }

    /// # Panics
    /// Panics if `index >= MAX_CUT_STAGES`.
    pub fn stage(&self, index: usize) -> &CascadeStage {
        &self.stages[index]
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        self.stages.iter_mut().fold(x, |acc, stage| stage.process_sample(acc))
    }

    /// Stage-major block processing; same result as per-sample
    pub fn process(&mut self, buffer: &mut [f32]) {
        for stage in self.stages.iter_mut() {
            stage.process(buffer);
        }
    }

    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        self.stages
            .iter()
            .map(|s| s.magnitude(freq, sample_rate))
            .product()
    }

    pub fn reset(&mut self) {
        self.stages.iter_mut().for_each(CascadeStage::reset);
    }
}

impl Default for CutFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal path of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    low_cut: CutFilter,
    peak: CascadeStage,
    high_cut: CutFilter,
}

impl FilterChain {
    /// Transparent chain: unity coefficients, default slopes
    pub fn new() -> Self {
        Self {
            low_cut: CutFilter::new(),
            peak: CascadeStage::new(Default::default()),
            high_cut: CutFilter::new(),
        }
    }

    /// Run a block through low-cut, peak, then high-cut, in place
    pub fn process(&mut self, buffer: &mut [f32]) {
        self.low_cut.process(buffer);
        self.peak.process(buffer);
        self.high_cut.process(buffer);
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let x = self.low_cut.process_sample(x);
        let x = self.peak.process_sample(x);
        self.high_cut.process_sample(x)
    }

    pub fn set_topology(&mut self, slope: Slope, kind: CutKind) {
        self.cut_mut(kind).set_topology(slope);
    }

    pub fn update_cut(&mut self, kind: CutKind, coeffs: &CoefficientSet, slope: Slope) {
        self.cut_mut(kind).update(coeffs, slope);
    }

    pub fn update_peak(&mut self, coeffs: &CoefficientSet) {
        debug_assert_eq!(coeffs.len(), 1);
        if let Some(section) = coeffs.iter().next() {
            self.peak.set_coeffs(*section);
        }
    }

    /// Write a full design into every slot
    pub fn apply(&mut self, coeffs: &ChainCoefficients) {
        self.update_cut(CutKind::LowCut, &coeffs.low_cut, coeffs.low_cut_slope);
        self.update_peak(&coeffs.peak);
        self.update_cut(CutKind::HighCut, &coeffs.high_cut, coeffs.high_cut_slope);
    }

    pub fn cut(&self, kind: CutKind) -> &CutFilter {
        match kind {
            CutKind::LowCut => &self.low_cut,
            CutKind::HighCut => &self.high_cut,
        }
    }

    fn cut_mut(&mut self, kind: CutKind) -> &mut CutFilter {
        match kind {
            CutKind::LowCut => &mut self.low_cut,
            CutKind::HighCut => &mut self.high_cut,
        }
    }

    pub fn peak(&self) -> &CascadeStage {
        &self.peak
    }

    pub fn set_peak_bypassed(&mut self, bypassed: bool) {
        self.peak.set_bypassed(bypassed);
    }

    pub fn stage(&self, position: ChainPosition) -> &CascadeStage {
        match position {
            ChainPosition::LowCut(i) => self.low_cut.stage(i),
            ChainPosition::Peak => &self.peak,
            ChainPosition::HighCut(i) => self.high_cut.stage(i),
        }
    }

    /// Linear gain at `freq` Hz: product over every enabled stage
    ///
    /// For visualization; never called from the audio path.
    pub fn magnitude_response(&self, freq: f64, sample_rate: f64) -> f64 {
        self.low_cut.magnitude(freq, sample_rate)
            * self.peak.magnitude(freq, sample_rate)
            * self.high_cut.magnitude(freq, sample_rate)
    }

    pub fn reset(&mut self) {
        self.low_cut.reset();
        self.peak.reset();
        self.high_cut.reset();
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::{design_low_cut, gain_to_db};
    use crate::domain::params::ChainSettings;

    const SAMPLE_RATE: f64 = 48000.0;

    fn generate_test_signal(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                0.4 * (2.0 * std::f32::consts::PI * 60.0 * t).sin()
                    + 0.3 * (2.0 * std::f32::consts::PI * 3000.0 * t).sin()
            })
            .collect()
    }

    fn shaped_chain() -> FilterChain {
        let settings = ChainSettings {
            low_cut_freq: 120.0,
            low_cut_slope: Slope::Db36,
            peak_gain_db: 5.0,
            high_cut_freq: 9000.0,
            high_cut_slope: Slope::Db24,
            ..Default::default()
        };
        let mut chain = FilterChain::new();
        chain.apply(&ChainCoefficients::design(&settings, SAMPLE_RATE));
        chain
    }

    #[test]
    fn test_topology_invariant_for_every_slope() {
        let mut chain = FilterChain::new();
        for kind in [CutKind::LowCut, CutKind::HighCut] {
            for slope in Slope::ALL {
                chain.set_topology(slope, kind);
                let cut = chain.cut(kind);
                assert_eq!(cut.enabled_count(), slope.sections());
                for (i, stage) in cut.stages().iter().enumerate() {
                    assert_eq!(
                        stage.is_bypassed(),
                        i >= slope.sections(),
                        "{kind:?} {slope} stage {i}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_topology_change_leaves_other_cut_alone() {
        let mut chain = FilterChain::new();
        chain.set_topology(Slope::Db48, CutKind::LowCut);
        chain.set_topology(Slope::Db24, CutKind::HighCut);
        chain.set_topology(Slope::Db12, CutKind::LowCut);
        assert_eq!(chain.cut(CutKind::LowCut).enabled_count(), 1);
        assert_eq!(chain.cut(CutKind::HighCut).enabled_count(), 2);
    }

    #[test]
    fn test_new_chain_is_transparent() {
        let mut chain = FilterChain::new();
        let input = generate_test_signal(512);
        let mut buffer = input.clone();
        chain.process(&mut buffer);
        assert_eq!(buffer, input);
        assert_eq!(ChainPosition::all().count(), 2 * MAX_CUT_STAGES + 1);
    }

    #[test]
    fn test_block_matches_per_sample() {
        let mut block_chain = shaped_chain();
        let mut sample_chain = shaped_chain();
        let input = generate_test_signal(1024);

        let mut block = input.clone();
        block_chain.process(&mut block);
        let per_sample: Vec<f32> = input.iter().map(|&x| sample_chain.process_sample(x)).collect();

        assert_eq!(block, per_sample);
    }

    #[test]
    fn test_update_writes_sections_in_order() {
        let mut chain = FilterChain::new();
        let coeffs = design_low_cut(200.0, Slope::Db48, SAMPLE_RATE);
        chain.update_cut(CutKind::LowCut, &coeffs, Slope::Db48);
        for (i, section) in coeffs.iter().enumerate() {
            assert_eq!(chain.stage(ChainPosition::LowCut(i)).coeffs(), section);
        }
    }

    #[test]
    fn test_magnitude_response_skips_bypassed_stages() {
        let mut chain = shaped_chain();
        let with_peak = gain_to_db(chain.magnitude_response(1000.0, SAMPLE_RATE));
        assert!((with_peak - 5.0).abs() < 0.2, "{with_peak}");

        chain.set_peak_bypassed(true);
        let without_peak = gain_to_db(chain.magnitude_response(1000.0, SAMPLE_RATE));
        assert!(without_peak.abs() < 0.2, "{without_peak}");

        let deep = gain_to_db(chain.magnitude_response(30.0, SAMPLE_RATE));
        assert!(deep < -30.0, "low cut too shallow: {deep}");
    }

    #[test]
    fn test_reset_clears_every_stage() {
        let mut chain = shaped_chain();
        let mut buffer = generate_test_signal(256);
        chain.process(&mut buffer);
        chain.reset();
        for position in ChainPosition::all() {
            assert_eq!(chain.stage(position).state(), [0.0; 4]);
        }
    }
}
