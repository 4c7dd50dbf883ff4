//! Carrier frequency and phase recovery
//!
//! Runs once per synchronized frame. The coarse frequency is seeded by the
//! first frame with a usable header SNR and then refined every `period`
//! frames from an inverse-variance weighted average of per-frame estimates.
//!
//! Each frame's estimate is taken over its known symbols (header and pilot
//! blocks) in three steps of growing lag: lag 1 across every block, lag 18
//! between sub-block sums, and the phase step between the two halves of each
//! block. Every step only has to resolve the error left by the one before,
//! so none of them aliases. Phase is then measured on every known block and
//! unwrapped from one block to the next with a slope that blends this
//! frame's estimate with what earlier frames have established.

use log::{debug, info};
use num_complex::Complex64;

use super::framer::PILOT_SYMBOL;
use super::frame_sync::SyncedFrame;
use super::plheader::encode_header;
use super::scrambler::PlScrambler;
use crate::domain::{RxError, RxResult, Sample, PILOT_BLOCK_LEN, PLHEADER_LEN};
use crate::dsp::nco::{wrap_phase, Nco};

/// Minimum differential coherence over the pilot blocks of a frame that
/// claims to carry pilots
pub const PILOT_THRESHOLD: f64 = 0.5;

/// Lowest header SNR (linear) at which a frame may seed the coarse estimate
pub const SEED_MIN_SNR: f64 = 2.0;

/// Sub-block length of the intermediate frequency step
const SUB_BLOCK: usize = 18;

const MIN_SNR: f64 = 0.1;
const MAX_SNR: f64 = 1e6;

fn c64(s: Sample) -> Complex64 {
    Complex64::new(s.re as f64, s.im as f64)
}

/// Sum of `r[k]·r*[k-1]` over a block, and the sum of the magnitudes
fn differential(r: &[Complex64]) -> (Complex64, f64) {
    r.windows(2).fold((Complex64::new(0.0, 0.0), 0.0), |(acc, norm), w| {
        let d = w[1] * w[0].conj();
        (acc + d, norm + d.norm())
    })
}

fn derotate(r: &[Complex64], freq: f64) -> Vec<Complex64> {
    r.iter()
        .enumerate()
        .map(|(i, &v)| v * Complex64::from_polar(1.0, -freq * i as f64))
        .collect()
}

/// Phase at `center` of a modulation-free block starting at `first`,
/// after removing the frequency `freq`
fn block_phase(r: &[Complex64], first: usize, center: f64, freq: f64) -> f64 {
    r.iter()
        .enumerate()
        .map(|(i, &v)| v * Complex64::from_polar(1.0, -freq * ((first + i) as f64 - center)))
        .sum::<Complex64>()
        .arg()
}

/// Known symbols of a frame with their modulation removed
struct KnownBlock {
    /// Index of the first symbol within the frame
    first: usize,
    symbols: Vec<Complex64>,
}

impl KnownBlock {
    fn center(&self) -> f64 {
        self.first as f64 + (self.symbols.len() as f64 - 1.0) / 2.0
    }
}

/// Frequency over the known blocks in radians per symbol, and the sum of
/// the cubed block lengths that its variance scales with
fn block_frequency(blocks: &[KnownBlock]) -> (f64, f64) {
    let lag1: Complex64 = blocks.iter().map(|b| differential(&b.symbols).0).sum();
    let coarse = lag1.arg();

    let lagged: Complex64 = blocks
        .iter()
        .map(|b| {
            let sums: Vec<Complex64> = derotate(&b.symbols, coarse)
                .chunks_exact(SUB_BLOCK)
                .map(|c| c.iter().sum::<Complex64>())
                .collect();
            sums.windows(2).map(|p| p[1] * p[0].conj()).sum::<Complex64>()
        })
        .sum();
    let medium = coarse + lagged.arg() / SUB_BLOCK as f64;

    let (num, den) = blocks.iter().fold((0.0, 0.0), |(num, den), b| {
        let len = b.symbols.len();
        let half = len / 2;
        let d = derotate(&b.symbols, medium);
        let early: Complex64 = d[..half].iter().sum();
        let late: Complex64 = d[half..].iter().sum();
        let weight = (len as f64).powi(3);
        (num + weight * (late * early.conj()).arg() / half as f64, den + weight)
    });
    (medium + num / den, den)
}

/// Linear SNR of a modulation-free block after removing `freq`
fn block_snr(r: &[Complex64], freq: f64) -> f64 {
    let d = derotate(r, freq);
    let n = d.len() as f64;
    let mean = d.iter().sum::<Complex64>() / n;
    let noise = d.iter().map(|v| (v - mean).norm_sqr()).sum::<f64>() / n;
    (mean.norm_sqr() / noise.max(1e-30)).clamp(MIN_SNR, MAX_SNR)
}

/// Phase reference: block centre (symbol index within the frame), unwrapped
/// absolute phase, and the weight of the block in the slope fit
#[derive(Debug, Clone, Copy)]
struct PhaseRef {
    center: f64,
    phase: f64,
    weight: f64,
}

/// Weighted least-squares slope of phase against time
fn fitted_slope(refs: &[PhaseRef]) -> f64 {
    let total: f64 = refs.iter().map(|r| r.weight).sum();
    let mean_t = refs.iter().map(|r| r.weight * r.center).sum::<f64>() / total;
    let mean_p = refs.iter().map(|r| r.weight * r.phase).sum::<f64>() / total;
    let (num, den) = refs.iter().fold((0.0, 0.0), |(num, den), r| {
        let dt = r.center - mean_t;
        (num + r.weight * dt * (r.phase - mean_p), den + r.weight * dt * dt)
    });
    num / den
}

pub struct CarrierRecovery {
    freq: f64,
    seeded: bool,
    /// Variance of `freq`, (rad/symbol)²
    prior: f64,
    /// Inverse-variance weighted sums of the per-frame estimates
    acc_weight: f64,
    acc_weighted: f64,
    acc_frames: usize,
    period: usize,
    updates: u64,
    residual: f64,
}

impl CarrierRecovery {
    /// `period`: frames accumulated per coarse frequency update
    pub fn new(period: usize) -> Self {
        Self {
            freq: 0.0,
            seeded: false,
            prior: 0.0,
            acc_weight: 0.0,
            acc_weighted: 0.0,
            acc_frames: 0,
            period: period.max(1),
            updates: 0,
            residual: 0.0,
        }
    }

    /// Coarse frequency estimate, radians per symbol
    pub fn frequency(&self) -> f64 {
        self.freq
    }

    /// Residual frequency applied to the last frame, radians per symbol
    pub fn residual(&self) -> f64 {
        self.residual
    }

    /// Number of coarse estimate updates so far
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Derotate a frame in place. Fails if the frame signals pilots that
    /// are not there.
    pub fn process(&mut self, frame: &mut SyncedFrame, scrambler: &PlScrambler) -> RxResult<()> {
        // Until seeded, each frame starts from its own header estimate
        let base = if self.seeded {
            self.freq
        } else {
            wrap_phase(frame.freq_hint)
        };

        let mut nco = Nco::new(base);
        let z: Vec<Complex64> = frame.symbols.iter().map(|&s| c64(nco.mix_down(s))).collect();

        let header_ref = encode_header(&frame.pls);
        let mut blocks = Vec::with_capacity(frame.pls.pilot_blocks() + 1);
        blocks.push(KnownBlock {
            first: 0,
            symbols: z[..PLHEADER_LEN]
                .iter()
                .zip(header_ref.iter())
                .map(|(&v, &h)| v * c64(h).conj())
                .collect(),
        });
        for b in 0..frame.pls.pilot_blocks() {
            let offset = frame.pls.pilot_offset(b);
            let first = PLHEADER_LEN + offset;
            blocks.push(KnownBlock {
                first,
                symbols: (0..PILOT_BLOCK_LEN)
                    .map(|i| z[first + i] * c64(scrambler.scrambled(PILOT_SYMBOL, offset + i)).conj())
                    .collect(),
            });
        }

        if blocks.len() > 1 {
            let (pilot_acc, pilot_norm) = blocks[1..].iter().fold(
                (Complex64::new(0.0, 0.0), 0.0),
                |(acc, norm), block| {
                    let (a, n) = differential(&block.symbols);
                    (acc + a, norm + n)
                },
            );
            let coherence = if pilot_norm > 0.0 { pilot_acc.norm() / pilot_norm } else { 0.0 };
            if coherence < PILOT_THRESHOLD {
                return Err(RxError::PilotsMissing(frame.start));
            }
        }

        let (estimate, cubes) = block_frequency(&blocks);
        let snr = block_snr(&blocks[0].symbols, estimate);
        let variance = 8.0 / (snr * cubes);

        // Slope used to unwrap the phase references: this frame's estimate
        // blended with the coarse estimate and the frames accumulated since
        let mut slope = if self.seeded {
            (estimate / variance + self.acc_weighted)
                / (1.0 / variance + 1.0 / self.prior + self.acc_weight)
        } else {
            estimate
        };

        let mut refs: Vec<PhaseRef> = Vec::with_capacity(blocks.len());
        for block in &blocks {
            let center = block.center();
            let measured = block_phase(&block.symbols, block.first, center, slope);
            let phase = match refs.last() {
                Some(last) => {
                    let predicted = last.phase + slope * (center - last.center);
                    predicted + wrap_phase(measured - predicted)
                }
                None => measured,
            };
            refs.push(PhaseRef {
                center,
                phase,
                weight: block.symbols.len() as f64,
            });
            if refs.len() > 1 {
                slope = fitted_slope(&refs);
            }
        }

        let mut segment = 0;
        for (n, (out, &v)) in frame.symbols.iter_mut().zip(z.iter()).enumerate() {
            let t = n as f64;
            while segment + 1 < refs.len() && t >= refs[segment + 1].center {
                segment += 1;
            }
            let a = refs[segment];
            let phase = match refs.get(segment + 1) {
                Some(b) if t >= a.center => {
                    a.phase + (b.phase - a.phase) * (t - a.center) / (b.center - a.center)
                }
                _ => a.phase + slope * (t - a.center),
            };
            let corrected = v * Complex64::from_polar(1.0, -phase);
            *out = Sample::new(corrected.re as f32, corrected.im as f32);
        }
        self.residual = slope;

        if self.seeded {
            self.accumulate(estimate, variance);
        } else if snr >= SEED_MIN_SNR {
            self.freq = wrap_phase(base + estimate);
            self.prior = variance;
            self.seeded = true;
            info!(
                "Coarse frequency seeded at frame {}: {:.6} rad/symbol (header SNR {:.1} dB)",
                frame.start,
                self.freq,
                10.0 * snr.log10()
            );
        } else {
            debug!("Header SNR {snr:.2} too low to seed the coarse frequency");
        }

        Ok(())
    }

    fn accumulate(&mut self, estimate: f64, variance: f64) {
        self.acc_weighted += estimate / variance;
        self.acc_weight += 1.0 / variance;
        self.acc_frames += 1;
        if self.acc_frames >= self.period {
            let step = self.acc_weighted / self.acc_weight;
            self.freq = wrap_phase(self.freq + step);
            self.prior = 1.0 / self.acc_weight;
            self.updates += 1;
            debug!(
                "Coarse frequency update {}: {:+.6} -> {:.6} rad/symbol",
                self.updates, step, self.freq
            );
            self.acc_weighted = 0.0;
            self.acc_weight = 0.0;
            self.acc_frames = 0;
        }
    }
}
