//! Root-raised-cosine matched filtering
//!
//! The matched filter is built as a polyphase bank: `nfilts` branches of the
//! same RRC response, branch `k` delayed by `k / nfilts` input samples. Branch
//! 0 is the plain matched filter at the input rate; the other branches let the
//! timing recovery loop read the filtered signal between input samples without
//! a separate interpolator.

use std::f64::consts::PI;

use crate::domain::Sample;

/// Extra samples of history kept so a branch can be read one or two samples back
const MAX_LAG: usize = 2;

/// RRC impulse response at `t` symbol periods from the peak
pub fn rrc_impulse(t: f64, rolloff: f64) -> f64 {
    let b = rolloff;
    if t.abs() < 1e-9 {
        return 1.0 - b + 4.0 * b / PI;
    }
    let x = 4.0 * b * t;
    if (x.abs() - 1.0).abs() < 1e-9 {
        let arg = PI / (4.0 * b);
        return b / 2f64.sqrt() * ((1.0 + 2.0 / PI) * arg.sin() + (1.0 - 2.0 / PI) * arg.cos());
    }
    ((PI * t * (1.0 - b)).sin() + x * (PI * t * (1.0 + b)).cos()) / (PI * t * (1.0 - x * x))
}

/// Raised-cosine pulse (RRC convolved with itself), unit peak
pub fn raised_cosine(t: f64, rolloff: f64) -> f64 {
    let sinc = |x: f64| if x.abs() < 1e-12 { 1.0 } else { (PI * x).sin() / (PI * x) };
    let d = 2.0 * rolloff * t;
    if (d.abs() - 1.0).abs() < 1e-9 {
        PI / 4.0 * sinc(1.0 / (2.0 * rolloff))
    } else {
        sinc(t) * (PI * rolloff * t).cos() / (1.0 - d * d)
    }
}

/// Immutable polyphase RRC tap set
#[derive(Debug, Clone)]
pub struct RrcFilterBank {
    branches: Vec<Vec<f32>>,
    ntaps: usize,
    rolloff: f32,
    sps: f32,
}

impl RrcFilterBank {
    /// - `rolloff`: excess bandwidth factor in (0, 1]
    /// - `delay`: filter span in symbol periods
    /// - `nfilts`: number of polyphase branches
    /// - `sps`: input samples per symbol
    pub fn new(rolloff: f32, delay: usize, nfilts: usize, sps: f32) -> Self {
        let ntaps = (delay as f32 * sps) as usize + 1;
        let center = (ntaps - 1) as f64 / 2.0;
        let nfilts = nfilts.max(1);

        let branches = (0..nfilts)
            .map(|k| {
                let shift = k as f64 / nfilts as f64;
                let taps: Vec<f64> = (0..ntaps)
                    .map(|m| rrc_impulse((m as f64 - center - shift) / sps as f64, rolloff as f64))
                    .collect();

                // Unit DC gain per branch keeps the interpolated amplitude
                // independent of the branch picked
                let sum: f64 = taps.iter().sum();
                taps.iter().map(|&t| (t / sum) as f32).collect()
            })
            .collect();

        Self {
            branches,
            ntaps,
            rolloff,
            sps,
        }
    }

    pub fn num_branches(&self) -> usize {
        self.branches.len()
    }

    pub fn taps_per_branch(&self) -> usize {
        self.ntaps
    }

    /// Taps of one branch; branch 0 is the plain matched filter
    pub fn taps(&self, branch: usize) -> &[f32] {
        &self.branches[branch]
    }

    pub fn rolloff(&self) -> f32 {
        self.rolloff
    }

    /// Input samples per symbol the taps were designed for
    pub fn sps(&self) -> f32 {
        self.sps
    }
}

/// Matched filter state: the tap bank plus a delay line of recent input
pub struct MatchedFilter {
    bank: RrcFilterBank,
    delay_line: Vec<Sample>,
    newest: usize,
}

impl MatchedFilter {
    pub fn new(bank: RrcFilterBank) -> Self {
        let len = bank.taps_per_branch() + MAX_LAG + 1;
        Self {
            bank,
            delay_line: vec![Sample::new(0.0, 0.0); len],
            newest: 0,
        }
    }

    pub fn bank(&self) -> &RrcFilterBank {
        &self.bank
    }

    /// Shift one input sample into the delay line
    pub fn push(&mut self, sample: Sample) {
        self.newest = (self.newest + 1) % self.delay_line.len();
        self.delay_line[self.newest] = sample;
    }

    /// Output of `branch` as it was `lag` input samples ago
    pub fn output(&self, branch: usize, lag: usize) -> Sample {
        let lag = lag.min(MAX_LAG);
        let len = self.delay_line.len();
        self.bank.branches[branch]
            .iter()
            .enumerate()
            .fold(Sample::new(0.0, 0.0), |acc, (m, &h)| {
                acc + self.delay_line[(self.newest + 2 * len - lag - m) % len] * h
            })
    }

    /// Push a sample and return the band-matched output at the input rate
    pub fn process(&mut self, sample: Sample) -> Sample {
        self.push(sample);
        self.output(0, 0)
    }

    /// Reset the filter state
    pub fn reset(&mut self) {
        self.delay_line.fill(Sample::new(0.0, 0.0));
        self.newest = 0;
    }
}

/// RRC pulse shaping of a symbol sequence at `sps` samples per symbol.
///
/// `timing_offset` delays every pulse by a (possibly fractional) number of
/// samples. The output carries `span` symbols of filter tail.
pub fn pulse_shape(
    symbols: &[Sample],
    sps: f32,
    rolloff: f32,
    span: usize,
    timing_offset: f32,
) -> Vec<Sample> {
    let sps = sps as f64;
    let half = span as f64 * sps / 2.0;
    let total = ((symbols.len() + span) as f64 * sps).ceil() as usize;
    let mut out = vec![Sample::new(0.0, 0.0); total];

    for (m, &a) in symbols.iter().enumerate() {
        let peak = m as f64 * sps + half + timing_offset as f64;
        let first = (peak - half).ceil().max(0.0) as usize;
        let last = ((peak + half).floor() as usize).min(total.saturating_sub(1));
        for (n, slot) in out.iter_mut().enumerate().take(last + 1).skip(first) {
            let g = rrc_impulse((n as f64 - peak) / sps, rolloff as f64) as f32;
            *slot += a * g;
        }
    }
    out
}
