//! Frame sink port

use crate::domain::{PlFrame, RxResult};

/// Consumer of recovered PLFRAMEs, e.g. the FEC decoder input
pub trait FrameSink {
    /// Accept one frame, in stream order
    fn write_frame(&mut self, frame: &PlFrame) -> RxResult<()>;

    /// Flush anything buffered
    fn flush(&mut self) -> RxResult<()> {
        Ok(())
    }
}
