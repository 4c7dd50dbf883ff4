//! Frame descrambling and emission

use log::trace;

use super::frame_sync::SyncedFrame;
use super::scrambler::PlScrambler;
use crate::domain::{PlFrame, PILOT_BLOCK_LEN, PLHEADER_LEN};

/// Turns phase-corrected frames into descrambled, pilot-free payloads
#[derive(Debug, Default)]
pub struct FrameEmitter {
    emitted: u64,
    dummies: u64,
}

impl FrameEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames handed out so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Dummy frames consumed without output
    pub fn dummies(&self) -> u64 {
        self.dummies
    }

    /// Descramble the body and strip the pilots. Dummy frames yield nothing.
    pub fn emit(&mut self, frame: SyncedFrame, scrambler: &PlScrambler) -> Option<PlFrame> {
        if frame.pls.modcod.is_dummy() {
            self.dummies += 1;
            trace!("Dummy frame at symbol {}", frame.start);
            return None;
        }

        let mut body = frame.symbols;
        body.drain(..PLHEADER_LEN);
        scrambler.descramble(&mut body);

        let pls = frame.pls;
        let mut payload = Vec::with_capacity(pls.payload_len());
        let mut cursor = 0;
        for block in 0..pls.pilot_blocks() {
            let offset = pls.pilot_offset(block);
            payload.extend_from_slice(&body[cursor..offset]);
            cursor = offset + PILOT_BLOCK_LEN;
        }
        payload.extend_from_slice(&body[cursor..]);

        self.emitted += 1;
        trace!("Frame {} at symbol {}: {}", self.emitted, frame.start, pls.modcod);
        Some(PlFrame {
            start: frame.start,
            pls,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FrameSize, Modcod, PlsCode, Sample};
    use crate::plsync::framer::PlFramer;

    fn ramp(n: usize) -> Vec<Sample> {
        (0..n).map(|i| Sample::new(i as f32, -(i as f32))).collect()
    }

    #[test]
    fn payload_is_descrambled_with_pilots_removed() {
        let framer = PlFramer::new(42);
        let scrambler = PlScrambler::new(42);
        let pls = PlsCode::new(Modcod::new(18), FrameSize::Normal, true);
        let payload = ramp(pls.payload_len());
        let symbols = framer.build(&pls, &payload).unwrap();

        let mut emitter = FrameEmitter::new();
        let frame = emitter
            .emit(SyncedFrame { start: 5, pls, symbols, freq_hint: 0.0 }, &scrambler)
            .expect("frame");
        assert_eq!(frame.start, 5);
        assert_eq!(frame.modcod(), Modcod::new(18));
        assert_eq!(frame.payload, payload);
        assert_eq!(emitter.emitted(), 1);
    }

    #[test]
    fn dummy_frames_are_consumed_silently() {
        let framer = PlFramer::new(0);
        let scrambler = PlScrambler::new(0);
        let pls = PlsCode::new(Modcod::DUMMY, FrameSize::Normal, false);
        let mut emitter = FrameEmitter::new();
        let out = emitter.emit(
            SyncedFrame { start: 0, pls, symbols: framer.dummy(), freq_hint: 0.0 },
            &scrambler,
        );
        assert!(out.is_none());
        assert_eq!(emitter.dummies(), 1);
        assert_eq!(emitter.emitted(), 0);
    }
}
