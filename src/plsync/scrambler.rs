//! PL scrambling
//!
//! Complex Gold-sequence scrambler applied to every PLFRAME body. The
//! sequence index `R(i)` in 0..4 selects a rotation by `j^R(i)`, which is a
//! swap and sign flip of the I/Q components, so scrambling followed by
//! descrambling gives back the exact input.

use crate::domain::Sample;

/// Period of the two m-sequences, 2^18 - 1
const SEQUENCE_PERIOD: usize = 262_143;

/// Offset between the two z components of R(i)
const Z_OFFSET: usize = 131_072;

/// Longest scrambled body of any PLFRAME: a normal QPSK frame with pilots,
/// 360 slots plus 22 pilot blocks
pub const SCRAMBLER_LEN: usize = 33_192;

/// Per-symbol rotation indices for one Gold code
#[derive(Debug, Clone)]
pub struct PlScrambler {
    sequence: Vec<u8>,
}

impl PlScrambler {
    /// Build the sequence for Gold code `gold_code` (0..=262142)
    pub fn new(gold_code: u32) -> Self {
        let mut x = vec![0u8; SEQUENCE_PERIOD];
        let mut y = vec![1u8; SEQUENCE_PERIOD];
        x[0] = 1;
        // x: 1 + X^7 + X^18, y: 1 + Y^5 + Y^7 + Y^10 + Y^18
        for i in 0..SEQUENCE_PERIOD - 18 {
            x[i + 18] = x[i + 7] ^ x[i];
            y[i + 18] = y[i + 10] ^ y[i + 7] ^ y[i + 5] ^ y[i];
        }

        let n = gold_code as usize % SEQUENCE_PERIOD;
        let z = |i: usize| x[(i + n) % SEQUENCE_PERIOD] ^ y[i];
        let sequence = (0..SCRAMBLER_LEN)
            .map(|i| 2 * z(i + Z_OFFSET) + z(i))
            .collect();

        Self { sequence }
    }

    /// Rotation index R(i) for body symbol `i`
    pub fn rotation(&self, i: usize) -> u8 {
        self.sequence[i % SCRAMBLER_LEN]
    }

    /// Scramble a frame body in place; index 0 is the first symbol after
    /// the PLHEADER
    pub fn scramble(&self, body: &mut [Sample]) {
        for (s, &r) in body.iter_mut().zip(self.sequence.iter()) {
            *s = rotate(*s, r);
        }
    }

    /// Undo `scramble`
    pub fn descramble(&self, body: &mut [Sample]) {
        for (s, &r) in body.iter_mut().zip(self.sequence.iter()) {
            *s = rotate(*s, (4 - r) & 3);
        }
    }

    /// The scrambled form of `symbol` at body position `i`
    pub fn scrambled(&self, symbol: Sample, i: usize) -> Sample {
        rotate(symbol, self.rotation(i))
    }
}

/// Multiply by j^r using component swaps only
fn rotate(s: Sample, r: u8) -> Sample {
    match r & 3 {
        0 => s,
        1 => Sample::new(-s.im, s.re),
        2 => Sample::new(-s.re, -s.im),
        _ => Sample::new(s.im, -s.re),
    }
}
