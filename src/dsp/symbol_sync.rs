//! Symbol timing recovery
//!
//! Gardner timing-error detector running on two strobes per symbol, a
//! proportional-plus-integral loop filter, and the polyphase matched filter
//! as the fractional-delay interpolator.

use std::f64::consts::PI;

use log::{info, warn};

use super::rrc::{raised_cosine, MatchedFilter, RrcFilterBank};
use crate::domain::Sample;

/// Largest average period deviation, as a fraction of the nominal `sps`
pub const MAX_DEVIATION: f64 = 0.05;

/// Magnitude limit on a single normalized timing error
const MAX_TED_ERROR: f64 = 1.0;

/// Smoothing of the symbol power estimate used to normalize the TED output
const POWER_SMOOTHING: f64 = 0.01;

/// Gardner detector slope per symbol of timing offset for a raised-cosine pulse.
///
/// For random symbols the expected error is
/// `E[e](τ) = Σ_m (p(m-1+τ) - p(m+τ)) p(m-1/2+τ)`; the gain is `-dE/dτ` at 0.
pub fn gardner_ted_gain(rolloff: f32) -> f64 {
    let rolloff = rolloff as f64;
    let s_curve = |tau: f64| -> f64 {
        (-24..=24)
            .map(|m| {
                let m = m as f64;
                (raised_cosine(m - 1.0 + tau, rolloff) - raised_cosine(m + tau, rolloff))
                    * raised_cosine(m - 0.5 + tau, rolloff)
            })
            .sum()
    };
    let h = 1e-4;
    -(s_curve(h) - s_curve(-h)) / (2.0 * h)
}

/// Proportional and integral gains of a second-order loop.
///
/// Impulse-invariant mapping of the analog closed-loop poles for natural
/// frequency `2π·loop_bw` (radians per symbol) and damping `damping`, scaled
/// by the detector gain.
pub fn loop_gains(loop_bw: f32, damping: f32, ted_gain: f64) -> (f64, f64) {
    if loop_bw <= 0.0 {
        return (0.0, 0.0);
    }
    let zeta = damping as f64;
    let omega_n_t = 2.0 * PI * loop_bw as f64;
    let zeta_omega_t = zeta * omega_n_t;
    let k1 = 2.0 * (-zeta_omega_t).exp();

    let cos_omega_d_t = if zeta < 1.0 {
        (omega_n_t * (1.0 - zeta * zeta).sqrt()).cos()
    } else if zeta > 1.0 {
        (omega_n_t * (zeta * zeta - 1.0).sqrt()).cosh()
    } else {
        1.0
    };

    let alpha = k1 * zeta_omega_t.sinh();
    let beta = 2.0 - (alpha + k1 * cos_omega_d_t);
    (alpha / ted_gain, beta / ted_gain)
}

/// Which half of the symbol the next strobe lands on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strobe {
    Symbol,
    Mid,
}

/// Symbol synchronizer: matched filter input, one output per symbol
pub struct SymbolSync {
    filter: MatchedFilter,
    nominal_period: f64,
    max_deviation: f64,
    avg_period: f64,
    inst_period: f64,
    alpha: f64,
    beta: f64,
    /// Index of the most recent input sample
    sample_index: f64,
    /// Time of the next strobe, in input samples
    next_strobe: f64,
    strobe: Strobe,
    prev_symbol: Option<Sample>,
    mid_sample: Sample,
    power: f64,
    resets: u64,
}

impl SymbolSync {
    /// - `bank`: polyphase RRC taps; branch count sets the interpolation
    ///   resolution, and its samples per symbol set the nominal period
    /// - `loop_bw`: normalized loop bandwidth; 0 runs at the fixed nominal rate
    /// - `damping`: loop damping factor
    pub fn new(bank: RrcFilterBank, loop_bw: f32, damping: f32) -> Self {
        let sps = bank.sps();
        let nominal_period = sps as f64;
        // Detector slope per input sample of timing offset
        let ted_gain = gardner_ted_gain(bank.rolloff()) / nominal_period;
        let (alpha, beta) = loop_gains(loop_bw, damping, ted_gain);

        if loop_bw <= 0.0 {
            info!("Symbol timing correction disabled, strobing at fixed {sps} samples/symbol");
        }

        Self {
            filter: MatchedFilter::new(bank),
            nominal_period,
            max_deviation: MAX_DEVIATION * nominal_period,
            avg_period: nominal_period,
            inst_period: nominal_period,
            alpha,
            beta,
            sample_index: -1.0,
            next_strobe: 0.0,
            strobe: Strobe::Symbol,
            prev_symbol: None,
            mid_sample: Sample::new(0.0, 0.0),
            power: 0.0,
            resets: 0,
        }
    }

    /// Current average symbol period in input samples
    pub fn period(&self) -> f64 {
        self.avg_period
    }

    /// Times the loop hit the period clamp and restarted from nominal
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Push one input sample; returns a symbol when a symbol strobe falls on it
    pub fn process(&mut self, sample: Sample) -> Option<Sample> {
        self.filter.push(sample);
        self.sample_index += 1.0;

        let mut output = None;
        while self.next_strobe <= self.sample_index {
            let value = self.interpolate(self.sample_index - self.next_strobe);
            match self.strobe {
                Strobe::Mid => {
                    self.mid_sample = value;
                    self.strobe = Strobe::Symbol;
                }
                Strobe::Symbol => {
                    self.on_symbol(value);
                    self.strobe = Strobe::Mid;
                    output = Some(value);
                }
            }
            self.next_strobe += self.inst_period / 2.0;
        }
        output
    }

    /// Process a block of input samples, appending recovered symbols to `out`
    pub fn process_block(&mut self, samples: &[Sample], out: &mut Vec<Sample>) {
        for &s in samples {
            if let Some(symbol) = self.process(s) {
                out.push(symbol);
            }
        }
    }

    /// Matched-filter output `delay` input samples before the newest one
    fn interpolate(&self, delay: f64) -> Sample {
        let branches = self.filter.bank().num_branches();
        let mut lag = delay.floor().max(0.0) as usize;
        let mut branch = ((delay - lag as f64) * branches as f64).round() as usize;
        if branch >= branches {
            branch = 0;
            lag += 1;
        }
        self.filter.output(branch, lag)
    }

    fn on_symbol(&mut self, symbol: Sample) {
        let energy = symbol.norm_sqr() as f64;
        self.power = if self.prev_symbol.is_none() {
            energy
        } else {
            (1.0 - POWER_SMOOTHING) * self.power + POWER_SMOOTHING * energy
        };

        if let Some(prev) = self.prev_symbol {
            let raw = ((prev - symbol) * self.mid_sample.conj()).re as f64;
            let error = if self.power > 1e-12 {
                (raw / self.power).clamp(-MAX_TED_ERROR, MAX_TED_ERROR)
            } else {
                0.0
            };
            self.advance_loop(error);
        }
        self.prev_symbol = Some(symbol);
    }

    fn advance_loop(&mut self, error: f64) {
        self.avg_period += self.beta * error;

        let low = self.nominal_period - self.max_deviation;
        let high = self.nominal_period + self.max_deviation;
        if self.avg_period <= low || self.avg_period >= high {
            warn!(
                "Symbol period {:.4} hit the clamp, re-acquiring from {:.4}",
                self.avg_period, self.nominal_period
            );
            self.avg_period = self.nominal_period;
            self.resets += 1;
        }

        self.inst_period = self.avg_period + self.alpha * error;
        if self.inst_period <= 0.0 {
            self.inst_period = self.avg_period;
        }
    }

    /// Drop loop and filter state, keeping the design parameters
    pub fn reset(&mut self) {
        self.filter.reset();
        self.avg_period = self.nominal_period;
        self.inst_period = self.nominal_period;
        self.sample_index = -1.0;
        self.next_strobe = 0.0;
        self.strobe = Strobe::Symbol;
        self.prev_symbol = None;
        self.mid_sample = Sample::new(0.0, 0.0);
        self.power = 0.0;
    }
}
