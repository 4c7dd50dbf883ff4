//! Automatic Gain Control

use crate::domain::Sample;

/// Gain never drops below this, so a loud burst cannot zero the stream
pub const AGC_MIN_GAIN: f32 = 1e-6;

/// Gain never exceeds this, so a dropout cannot blow up the stream
pub const AGC_MAX_GAIN: f32 = 65_536.0;

/// Complex AGC driving the output magnitude toward a reference level
pub struct Agc {
    reference: f32,
    rate: f32,
    gain: f32,
}

impl Agc {
    /// - `gain`: initial gain
    /// - `rate`: update step size (small, e.g. 1e-5)
    /// - `reference`: target output magnitude
    pub fn new(gain: f32, rate: f32, reference: f32) -> Self {
        Self {
            reference,
            rate,
            gain: gain.clamp(AGC_MIN_GAIN, AGC_MAX_GAIN),
        }
    }

    /// Process a sample through AGC
    pub fn process(&mut self, sample: Sample) -> Sample {
        let sample = if sample.re.is_finite() && sample.im.is_finite() {
            sample
        } else {
            Sample::new(0.0, 0.0)
        };
        let output = sample * self.gain;

        // Exponential estimator: the relative error nudges the gain up or down
        let error = (self.reference - output.norm()) / self.reference;
        self.gain *= 1.0 + self.rate * error.clamp(-1.0, 1.0);
        self.gain = self.gain.clamp(AGC_MIN_GAIN, AGC_MAX_GAIN);

        output
    }

    /// Process a block in place
    pub fn process_block(&mut self, samples: &mut [Sample]) {
        for s in samples.iter_mut() {
            *s = self.process(*s);
        }
    }

    /// Get current gain value
    pub fn current_gain(&self) -> f32 {
        self.gain
    }
}
