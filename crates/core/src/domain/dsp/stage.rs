use super::biquad::BiquadCoeffs;

/// One second-order IIR section with its own delay memory
///
/// Samples enter and leave as `f32`; the recurrence and its memory run in
/// `f64` to match the coefficients.
///
/// A bypassed stage passes samples through untouched and leaves its delay
/// state alone, so re-enabling it resumes from where it stopped. Swapping
/// coefficients never clears the state either.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeStage {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f64,
    x2: f64,
    // Previous output samples (y[n-1], y[n-2])
    y1: f64,
    y2: f64,
    bypassed: bool,
}

impl CascadeStage {
    /// Enabled stage with the given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            bypassed: false,
        }
    }

    /// Bypassed stage holding unity coefficients
    pub fn bypassed() -> Self {
        Self {
            bypassed: true,
            ..Self::new(BiquadCoeffs::default())
        }
    }

    /// Replace the coefficients; delay state is kept
    #[inline]
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    #[inline]
    pub fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn is_enabled(&self) -> bool {
        !self.bypassed
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        if self.bypassed {
            return x;
        }

        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let x = x as f64;
        let c = &self.coeffs;
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y as f32
    }

    /// Process a buffer of samples in place
    pub fn process(&mut self, buffer: &mut [f32]) {
        if self.bypassed {
            return;
        }
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Clear delay memory
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    /// Linear magnitude at `freq` Hz; a bypassed stage contributes unity
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        if self.bypassed {
            1.0
        } else {
            self.coeffs.magnitude(freq, sample_rate)
        }
    }

    /// Delay memory as `[x1, x2, y1, y2]`
    pub fn state(&self) -> [f64; 4] {
        [self.x1, self.x2, self.y1, self.y2]
    }
}

impl Default for CascadeStage {
    fn default() -> Self {
        Self::bypassed()
    }
}
