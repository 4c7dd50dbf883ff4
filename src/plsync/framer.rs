//! PLFRAME builder
//!
//! Assembles header, data slots and pilot blocks, then scrambles the body.
//! The receiver's inverse; used to generate test signals.

use std::f32::consts::FRAC_1_SQRT_2;

use super::plheader::encode_header;
use super::scrambler::PlScrambler;
use crate::domain::{
    FrameSize, Modcod, PlsCode, RxError, RxResult, Sample, PILOT_BLOCK_LEN, PLHEADER_LEN,
    SLOTS_PER_PILOT_BLOCK, SLOT_LEN,
};

/// Unmodulated pilot symbol before scrambling
pub const PILOT_SYMBOL: Sample = Sample::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2);

/// Transmit-side PLFRAME builder for one Gold code
pub struct PlFramer {
    scrambler: PlScrambler,
}

impl PlFramer {
    pub fn new(gold_code: u32) -> Self {
        Self {
            scrambler: PlScrambler::new(gold_code),
        }
    }

    /// Build a complete PLFRAME from `pls.payload_len()` data symbols
    pub fn build(&self, pls: &PlsCode, payload: &[Sample]) -> RxResult<Vec<Sample>> {
        if payload.len() != pls.payload_len() {
            return Err(RxError::Framing(format!(
                "{} frame needs {} payload symbols, got {}",
                pls.modcod,
                pls.payload_len(),
                payload.len()
            )));
        }

        let mut frame = encode_header(pls);
        frame.reserve(pls.body_len());

        let pilot_blocks = pls.pilot_blocks();
        let group = SLOTS_PER_PILOT_BLOCK * SLOT_LEN;
        for (i, chunk) in payload.chunks(group).enumerate() {
            frame.extend_from_slice(chunk);
            if i < pilot_blocks {
                frame.extend(std::iter::repeat(PILOT_SYMBOL).take(PILOT_BLOCK_LEN));
            }
        }

        self.scrambler.scramble(&mut frame[PLHEADER_LEN..]);
        Ok(frame)
    }

    /// A dummy PLFRAME: unmodulated carrier in every slot
    pub fn dummy(&self) -> Vec<Sample> {
        let pls = PlsCode::new(Modcod::DUMMY, FrameSize::Normal, false);
        let mut frame = encode_header(&pls);
        frame.extend(std::iter::repeat(PILOT_SYMBOL).take(pls.body_len()));
        self.scrambler.scramble(&mut frame[PLHEADER_LEN..]);
        frame
    }
}
