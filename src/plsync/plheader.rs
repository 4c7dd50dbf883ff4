//! PLHEADER coding
//!
//! The 90-symbol header is the 26-bit start-of-frame pattern followed by the
//! 64-bit PLSC codeword, all π/2-BPSK modulated. The PLSC carries the 7-bit
//! PLS code through a (64,7) biorthogonal code, XORed with a fixed
//! scrambling word.
//!
//! Detection uses differential products `w[k]·w*[k-1]`, which are insensitive
//! to the carrier phase and only rotated by the carrier frequency offset.

use std::f64::consts::FRAC_1_SQRT_2;

use num_complex::Complex64;

use crate::domain::{PlsCode, Sample, PLHEADER_LEN};
use crate::dsp::nco::wrap_phase;

/// Start-of-frame pattern, 26 bits MSB first
pub const SOF_BITS: u32 = 0x18D_2E82;
pub const SOF_LEN: usize = 26;

pub const PLSC_LEN: usize = 64;

/// Fixed scrambling word XORed onto every PLSC codeword, MSB first
pub const PLSC_SCRAMBLER: u64 = 0x719D_83C9_5342_2DFA;

/// Rows of the (32,6) first-order Reed-Muller generator, MSB = first bit
const RM_GENERATOR: [u32; 6] = [
    0x5555_5555,
    0x3333_3333,
    0x0F0F_0F0F,
    0x00FF_00FF,
    0x0000_FFFF,
    0xFFFF_FFFF,
];

/// Header detection threshold on the normalized correlation score
pub const DETECTION_THRESHOLD: f32 = 0.6;

/// Largest Hamming distance accepted between the received PLSC and the
/// decoded codeword
pub const PLSC_MAX_BIT_ERRORS: u32 = 8;

/// Lowest normalized coherence of the best codeword hypothesis. Windows that
/// are mostly silence or noise never reach it.
pub const MIN_DECODE_COHERENCE: f64 = 0.5;

/// Mean symbol energy below which a window is treated as silence
const MIN_SYMBOL_ENERGY: f64 = 1e-9;

/// Differential terms in the score: 25 from the SOF, 32 PLSC pairs
const PLSC_PAIRS: usize = PLSC_LEN / 2;
const SCORE_TERMS: usize = SOF_LEN - 1 + PLSC_PAIRS;

/// Segment length for the per-hypothesis residual frequency estimate
const DECODE_SEGMENT: usize = 10;

/// π/2-BPSK symbol for `bit` at header position `index`
pub fn pi2_bpsk(bit: bool, index: usize) -> Sample {
    let a = FRAC_1_SQRT_2 as f32;
    let sign = if bit { -1.0 } else { 1.0 };
    if index % 2 == 0 {
        Sample::new(a * sign, a * sign)
    } else {
        Sample::new(-a * sign, a * sign)
    }
}

fn sof_bit(i: usize) -> bool {
    (SOF_BITS >> (SOF_LEN - 1 - i)) & 1 != 0
}

fn plsc_scrambler_bit(i: usize) -> bool {
    (PLSC_SCRAMBLER >> (PLSC_LEN - 1 - i)) & 1 != 0
}

/// The 64 PLSC bits for a 7-bit code before scrambling, MSB first
pub fn plsc_code_bits(code: u8) -> u64 {
    let info = (code >> 1) & 0x3f;
    let pilots = u32::from(code & 1);
    let y = RM_GENERATOR
        .iter()
        .enumerate()
        .filter(|(row, _)| (info >> (5 - row)) & 1 != 0)
        .fold(0u32, |acc, (_, g)| acc ^ g);

    (0..32).fold(0u64, |acc, i| {
        let bit = u64::from((y >> (31 - i)) & 1);
        let pair = (bit << 1) | (bit ^ u64::from(pilots));
        (acc << 2) | pair
    })
}

/// The transmitted (scrambled) PLSC codeword for a 7-bit code
pub fn plsc_codeword(code: u8) -> u64 {
    plsc_code_bits(code) ^ PLSC_SCRAMBLER
}

/// The 26 SOF symbols
pub fn sof_symbols() -> Vec<Sample> {
    (0..SOF_LEN).map(|i| pi2_bpsk(sof_bit(i), i)).collect()
}

/// Modulate the full 90-symbol PLHEADER for `pls`
pub fn encode_header(pls: &PlsCode) -> Vec<Sample> {
    let codeword = plsc_codeword(pls.code());
    (0..PLHEADER_LEN)
        .map(|i| {
            let bit = if i < SOF_LEN {
                sof_bit(i)
            } else {
                (codeword >> (PLSC_LEN - 1 - (i - SOF_LEN))) & 1 != 0
            };
            pi2_bpsk(bit, i)
        })
        .collect()
}

/// Centre of the header, in symbols from its first symbol
pub const HEADER_CENTER: f64 = (PLHEADER_LEN as f64 - 1.0) / 2.0;

/// Correlation of a 90-symbol window against the header differential pattern
#[derive(Debug, Clone, Copy)]
pub struct HeaderMetric {
    /// Normalized score in [0, 1]
    pub score: f32,
    /// SOF differential correlation; its angle is the frequency offset in
    /// radians per symbol
    pub sof_corr: Complex64,
    /// PLSC pair correlation, pointing against `sof_corr` when the pilots
    /// flag is set
    pub plsc_corr: Complex64,
}

/// Best fit of one codeword hypothesis to a derotated header
#[derive(Debug, Clone, Copy)]
struct Hypothesis {
    /// Coherent sum of the modulation-free header around its centre
    corr: Complex64,
    /// Residual frequency, radians per symbol
    freq: f64,
}

impl Hypothesis {
    /// `reference` holds the conjugated header symbols of the hypothesis
    fn evaluate(derotated: &[Complex64], reference: &[Complex64]) -> Self {
        let mut segments = [Complex64::new(0.0, 0.0); PLHEADER_LEN / DECODE_SEGMENT];
        for (k, (&v, &r)) in derotated.iter().zip(reference).enumerate() {
            segments[k / DECODE_SEGMENT] += v * r;
        }
        let lagged: Complex64 = segments.windows(2).map(|p| p[1] * p[0].conj()).sum();
        let freq = lagged.arg() / DECODE_SEGMENT as f64;

        let corr = derotated
            .iter()
            .zip(reference)
            .enumerate()
            .map(|(k, (&v, &r))| v * r * Complex64::from_polar(1.0, -freq * (k as f64 - HEADER_CENTER)))
            .sum();
        Self { corr, freq }
    }
}

/// Precomputed references for header detection and decoding
#[derive(Debug, Clone)]
pub struct HeaderCorrelator {
    sof_diff: Vec<Complex64>,
    plsc_diff: Vec<Complex64>,
    /// Conjugated header symbols of all 128 PLS codes
    headers: Vec<Vec<Complex64>>,
    /// Unscrambled 64-bit words of all 128 PLS codes
    codebook: Vec<u64>,
}

impl Default for HeaderCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

fn to_c64(s: Sample) -> Complex64 {
    Complex64::new(s.re as f64, s.im as f64)
}

impl HeaderCorrelator {
    pub fn new() -> Self {
        let sof = sof_symbols();
        let sof_diff = (1..SOF_LEN)
            .map(|k| to_c64(sof[k] * sof[k - 1].conj()))
            .collect();

        // Within a PLSC pair the second bit differs from the first only by
        // the pilots flag, so the pair product is ±j up to that global sign
        let plsc_diff = (0..PLSC_PAIRS)
            .map(|m| {
                let flip = plsc_scrambler_bit(2 * m) ^ plsc_scrambler_bit(2 * m + 1);
                Complex64::new(0.0, if flip { -1.0 } else { 1.0 })
            })
            .collect();

        let headers = (0..128u8)
            .map(|code| {
                encode_header(&PlsCode::from_code(code))
                    .into_iter()
                    .map(|s| to_c64(s).conj())
                    .collect()
            })
            .collect();
        let codebook = (0..128u8).map(plsc_code_bits).collect();

        Self {
            sof_diff,
            plsc_diff,
            headers,
            codebook,
        }
    }

    /// Score a window whose first symbol is the candidate header start.
    ///
    /// The correlation is divided by its Cauchy-Schwarz bound over all 57
    /// differential terms, so a window scores 1 only if every term matches
    /// the pattern with equal energy. Windows that are partly silent score
    /// in proportion to the square root of the terms they fill.
    pub fn metric(&self, window: &[Sample]) -> HeaderMetric {
        debug_assert!(window.len() >= PLHEADER_LEN);
        let w = |k: usize| to_c64(window[k]);

        let mut energy = 0.0;
        let mut sof_corr = Complex64::new(0.0, 0.0);
        for k in 1..SOF_LEN {
            let d = w(k) * w(k - 1).conj();
            energy += d.norm_sqr();
            sof_corr += d * self.sof_diff[k - 1].conj();
        }

        let mut plsc_corr = Complex64::new(0.0, 0.0);
        for m in 0..PLSC_PAIRS {
            let first = SOF_LEN + 2 * m;
            let d = w(first + 1) * w(first).conj();
            energy += d.norm_sqr();
            plsc_corr += d * self.plsc_diff[m].conj();
        }

        let score = if energy > 0.0 {
            let bound = (SCORE_TERMS as f64 * energy).sqrt();
            ((sof_corr.norm() + plsc_corr.norm()) / bound) as f32
        } else {
            0.0
        };
        HeaderMetric {
            score,
            sof_corr,
            plsc_corr,
        }
    }

    /// Decode the PLS code of a header window.
    ///
    /// The window is first derotated by the frequency of all 57 differential
    /// terms. Each of the 128 codeword hypotheses then removes its own
    /// modulation, estimates the residual frequency from 10-symbol segment
    /// sums, and is scored by its coherent sum. Phase is never carried
    /// further than the header centre, so frequency error only costs
    /// coherence at the edges.
    pub fn decode(&self, window: &[Sample]) -> Option<PlscDecode> {
        let metric = self.metric(window);
        let window = &window[..PLHEADER_LEN];
        let energy: f64 = window.iter().map(|&s| to_c64(s).norm_sqr()).sum();
        if energy < MIN_SYMBOL_ENERGY * PLHEADER_LEN as f64 {
            return None;
        }

        let pilots_sign = if (metric.plsc_corr * metric.sof_corr.conj()).re >= 0.0 {
            1.0
        } else {
            -1.0
        };
        let coarse = (metric.sof_corr + metric.plsc_corr * pilots_sign).arg();
        let derotated: Vec<Complex64> = window
            .iter()
            .enumerate()
            .map(|(k, &s)| to_c64(s) * Complex64::from_polar(1.0, -coarse * k as f64))
            .collect();

        let (code, best) = self
            .headers
            .iter()
            .map(|reference| Hypothesis::evaluate(&derotated, reference))
            .enumerate()
            .fold(None, |best: Option<(usize, Hypothesis)>, (code, hyp)| match best {
                Some((_, b)) if b.corr.norm() >= hyp.corr.norm() => best,
                _ => Some((code, hyp)),
            })?;

        let coherence = best.corr.norm() / (PLHEADER_LEN as f64 * energy).sqrt();
        if coherence < MIN_DECODE_COHERENCE {
            return None;
        }

        // Hard PLSC bits against the winning phase and frequency, after
        // undoing the PLSC scrambling
        let center_phase = best.corr.arg();
        let hard = (0..PLSC_LEN).fold(0u64, |acc, i| {
            let k = SOF_LEN + i;
            let rotation = center_phase + best.freq * (k as f64 - HEADER_CENTER);
            let axis = to_c64(pi2_bpsk(false, k));
            let soft = (derotated[k] * Complex64::from_polar(1.0, -rotation) * axis.conj()).re;
            let bit = (soft < 0.0) ^ plsc_scrambler_bit(i);
            (acc << 1) | u64::from(bit)
        });
        let distance = (hard ^ self.codebook[code]).count_ones();
        if distance > PLSC_MAX_BIT_ERRORS {
            return None;
        }

        let pls = PlsCode::from_code(code as u8);
        if !pls.is_valid() {
            return None;
        }

        Some(PlscDecode {
            pls,
            distance,
            freq: coarse + best.freq,
            phase: wrap_phase(center_phase - best.freq * HEADER_CENTER),
            score: metric.score,
            coherence,
        })
    }
}

/// Result of a successful PLSC decode
#[derive(Debug, Clone, Copy)]
pub struct PlscDecode {
    pub pls: PlsCode,
    /// Hamming distance between received hard bits and the codeword
    pub distance: u32,
    /// Frequency estimate over the whole header, radians per symbol
    pub freq: f64,
    /// Carrier phase at the first header symbol
    pub phase: f64,
    pub score: f32,
    /// Normalized coherent correlation of the decoded header, in [0, 1]
    pub coherence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FrameSize, Modcod};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    fn rotate(symbols: &[Sample], freq: f64, phase: f64) -> Vec<Sample> {
        symbols
            .iter()
            .enumerate()
            .map(|(k, &s)| {
                let r = freq * k as f64 + phase;
                s * Sample::new(r.cos() as f32, r.sin() as f32)
            })
            .collect()
    }

    #[test]
    fn first_reed_muller_rows_produce_known_words() {
        // Code 0b0000010: only the last generator row (all ones)
        assert_eq!(plsc_code_bits(0b000_0010), u64::MAX);
        assert_eq!(plsc_code_bits(0), 0);
        // Pilots flag inverts every second bit
        assert_eq!(plsc_code_bits(1), 0x5555_5555_5555_5555);
    }

    #[test]
    fn all_codewords_are_far_apart() {
        let words: Vec<u64> = (0..128u8).map(plsc_code_bits).collect();
        for i in 0..words.len() {
            for j in i + 1..words.len() {
                assert!((words[i] ^ words[j]).count_ones() >= 32, "codes {i} and {j}");
            }
        }
    }

    #[test]
    fn sof_symbols_follow_the_pattern() {
        let sof = sof_symbols();
        // 26-bit SOF starts 0b0110 0011 ...
        assert_eq!(sof.len(), SOF_LEN);
        assert_eq!(sof[0], pi2_bpsk(false, 0));
        assert_eq!(sof[1], pi2_bpsk(true, 1));
        assert_eq!(sof[3], pi2_bpsk(false, 3));
        assert_eq!(sof[6], pi2_bpsk(true, 6));
        assert!((sof[1] - Sample::new(0.70710677, -0.70710677)).norm() < 1e-6);
        assert!((sof[6] - Sample::new(-0.70710677, -0.70710677)).norm() < 1e-6);
        assert!((pi2_bpsk(false, 1) - Sample::new(-0.70710677, 0.70710677)).norm() < 1e-6);
    }

    #[test]
    fn clean_header_scores_one() {
        let correlator = HeaderCorrelator::new();
        let pls = PlsCode::new(Modcod::new(1), FrameSize::Normal, true);
        let header = encode_header(&pls);
        let metric = correlator.metric(&header);
        assert!((metric.score - 1.0).abs() < 1e-5);
        assert!(metric.sof_corr.arg().abs() < 1e-6);
    }

    #[test]
    fn shifted_window_scores_below_threshold() {
        let correlator = HeaderCorrelator::new();
        let pls = PlsCode::new(Modcod::new(6), FrameSize::Short, false);
        let mut stream = vec![Sample::new(0.5, -0.5); 10];
        stream.extend(encode_header(&pls));
        stream.extend(vec![Sample::new(-0.5, -0.5); 10]);
        for offset in 0..20 {
            let score = correlator.metric(&stream[offset..offset + PLHEADER_LEN]).score;
            if offset == 10 {
                assert!(score > 0.99);
            } else {
                assert!(score < DETECTION_THRESHOLD, "offset {offset} scored {score}");
            }
        }
    }

    #[test]
    fn decodes_every_valid_code_under_rotation() {
        let correlator = HeaderCorrelator::new();
        for code in 0..128u8 {
            let pls = PlsCode::from_code(code);
            let header = rotate(&encode_header(&pls), 0.03, 2.1);
            let decoded = correlator.decode(&header);
            if pls.is_valid() {
                let decoded = decoded.unwrap_or_else(|| panic!("code {code} not decoded"));
                assert_eq!(decoded.pls, pls);
                assert_eq!(decoded.distance, 0);
                assert!((decoded.freq - 0.03).abs() < 1e-4);
            } else {
                assert!(decoded.is_none(), "reserved code {code} accepted");
            }
        }
    }

    #[test]
    fn decode_tolerates_a_few_bit_errors() {
        let correlator = HeaderCorrelator::new();
        let pls = PlsCode::new(Modcod::new(12), FrameSize::Normal, true);
        let mut header = encode_header(&pls);
        for k in [30, 41, 57, 88] {
            header[k] = -header[k];
        }
        let decoded = correlator.decode(&header).expect("decoded");
        assert_eq!(decoded.pls, pls);
        assert_eq!(decoded.distance, 4);
    }

    #[test]
    fn silence_scores_zero() {
        let correlator = HeaderCorrelator::new();
        let metric = correlator.metric(&[Sample::new(0.0, 0.0); PLHEADER_LEN]);
        assert_eq!(metric.score, 0.0);
    }

    /// Rotate and add complex white noise at `esn0_db` for unit-energy symbols
    fn channel(symbols: &[Sample], esn0_db: f64, freq: f64, phase: f64, rng: &mut StdRng) -> Vec<Sample> {
        let sigma = (10f64.powf(-esn0_db / 10.0) / 2.0).sqrt();
        let normal = Normal::new(0.0, sigma).unwrap();
        rotate(symbols, freq, phase)
            .into_iter()
            .map(|s| s + Sample::new(normal.sample(rng) as f32, normal.sample(rng) as f32))
            .collect()
    }

    fn random_valid_code(rng: &mut StdRng) -> PlsCode {
        loop {
            let pls = PlsCode::from_code(rng.gen_range(0..128u8));
            if pls.is_valid() {
                return pls;
            }
        }
    }

    #[test]
    fn decodes_noisy_headers_at_6db() {
        let correlator = HeaderCorrelator::new();
        let mut rng = StdRng::seed_from_u64(6);
        let trials = 200;
        let mut decoded_ok = 0;
        let mut detected = 0;
        for _ in 0..trials {
            let pls = random_valid_code(&mut rng);
            let freq = rng.gen_range(-0.02..0.02);
            let phase = rng.gen_range(-3.1..3.1);
            let header = channel(&encode_header(&pls), 6.0, freq, phase, &mut rng);

            if correlator.metric(&header).score >= DETECTION_THRESHOLD {
                detected += 1;
            }
            if let Some(decoded) = correlator.decode(&header) {
                if decoded.pls == pls {
                    decoded_ok += 1;
                    assert!((decoded.freq - freq).abs() < 0.01, "freq {} vs {freq}", decoded.freq);
                }
            }
        }
        assert!(detected >= trials - 2, "detected {detected}/{trials}");
        assert!(decoded_ok >= trials - 5, "decoded {decoded_ok}/{trials}");
    }

    #[test]
    fn decodes_a_noiseless_header_with_a_large_offset() {
        let correlator = HeaderCorrelator::new();
        let pls = PlsCode::new(Modcod::new(4), FrameSize::Short, true);
        let header = rotate(&encode_header(&pls), 0.11, -0.4);
        let decoded = correlator.decode(&header).expect("decoded");
        assert_eq!(decoded.pls, pls);
        assert_eq!(decoded.distance, 0);
        assert!((decoded.freq - 0.11).abs() < 1e-6);
        assert!((decoded.phase + 0.4).abs() < 1e-6);
    }

    #[test]
    fn mostly_silent_window_is_rejected() {
        let correlator = HeaderCorrelator::new();
        let mut window = vec![Sample::new(0.0, 0.0); PLHEADER_LEN - 2];
        window.push(Sample::new(0.7, 0.7));
        window.push(Sample::new(-0.7, 0.7));
        assert!(correlator.metric(&window).score < 0.2);
        assert!(correlator.decode(&window).is_none());
    }

    #[test]
    fn partial_headers_against_silence_score_below_threshold() {
        let correlator = HeaderCorrelator::new();
        let silence = Sample::new(0.0, 0.0);
        for code in [4u8, 17, 61, 110] {
            let header = encode_header(&PlsCode::from_code(code));
            for n in 1..PLHEADER_LEN {
                let mut leading = vec![silence; n];
                leading.extend_from_slice(&header[..PLHEADER_LEN - n]);
                let mut trailing = header[n..].to_vec();
                trailing.extend(std::iter::repeat(silence).take(n));
                for window in [leading, trailing] {
                    let score = correlator.metric(&window).score;
                    assert!(score < DETECTION_THRESHOLD, "code {code} shift {n} scored {score}");
                }
            }
        }
    }
}
