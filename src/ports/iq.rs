//! IQ sample source port

use crate::domain::{RxResult, Sample};

/// Source of complex baseband samples.
///
/// `Send` so the pipeline can move it onto its reader thread.
pub trait IqSource: Send {
    /// Fill `buffer` with up to `buffer.len()` samples, returning how many
    /// were written. `Ok(0)` means end of stream.
    fn read_samples(&mut self, buffer: &mut [Sample]) -> RxResult<usize>;
}
