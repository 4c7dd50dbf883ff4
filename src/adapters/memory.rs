//! In-memory source and sink for tests and offline processing

use crate::domain::{PlFrame, RxResult, Sample};
use crate::ports::{FrameSink, IqSource};

/// Serves a fixed sample vector in caller-sized chunks
pub struct MemoryIqSource {
    samples: Vec<Sample>,
    position: usize,
}

impl MemoryIqSource {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            position: 0,
        }
    }
}

impl IqSource for MemoryIqSource {
    fn read_samples(&mut self, buffer: &mut [Sample]) -> RxResult<usize> {
        let n = buffer.len().min(self.samples.len() - self.position);
        buffer[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

/// Keeps every frame it is given
#[derive(Debug, Default)]
pub struct FrameCollector {
    pub frames: Vec<PlFrame>,
}

impl FrameCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for FrameCollector {
    fn write_frame(&mut self, frame: &PlFrame) -> RxResult<()> {
        self.frames.push(frame.clone());
        Ok(())
    }
}
