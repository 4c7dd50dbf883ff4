//! Numerically Controlled Oscillator

use std::f64::consts::PI;

use crate::domain::Sample;

/// Wrap a phase into (-π, π]
pub fn wrap_phase(phase: f64) -> f64 {
    let wrapped = (phase + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Complex oscillator used to rotate samples by a running phase.
///
/// The increment is in radians per sample (or per symbol, when the NCO runs
/// at the symbol rate).
pub struct Nco {
    phase: f64,
    phase_increment: f64,
}

impl Nco {
    pub fn new(phase_increment: f64) -> Self {
        Self {
            phase: 0.0,
            phase_increment,
        }
    }

    /// Next unit phasor e^{jφ}, then advance
    pub fn next_phasor(&mut self) -> Sample {
        let phasor = Sample::new(self.phase.cos() as f32, self.phase.sin() as f32);
        self.phase = wrap_phase(self.phase + self.phase_increment);
        phasor
    }

    /// Rotate a sample forward by the oscillator phase (frequency shift up)
    pub fn mix_up(&mut self, sample: Sample) -> Sample {
        sample * self.next_phasor()
    }

    /// Rotate a sample backward by the oscillator phase (derotation)
    pub fn mix_down(&mut self, sample: Sample) -> Sample {
        sample * self.next_phasor().conj()
    }
}
