//! Interleaved unsigned 8-bit IQ reader
//!
//! The usual RTL-SDR style capture format: one byte of I, one byte of Q,
//! offset binary around 127.

use std::io::{ErrorKind, Read};

use crate::domain::{RxResult, Sample};
use crate::ports::IqSource;

/// Convert one offset-binary byte to a sample component in [-1, 1)
pub fn u8_to_f32(b: u8) -> f32 {
    (b as f32 - 127.0) / 128.0
}

/// `IqSource` over any byte stream of interleaved u8 I/Q pairs
pub struct U8IqReader<R> {
    reader: R,
    bytes: Vec<u8>,
    /// A lone I byte left over from the previous read
    pending: Option<u8>,
}

impl<R: Read + Send> U8IqReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            bytes: Vec::new(),
            pending: None,
        }
    }
}

impl<R: Read + Send> IqSource for U8IqReader<R> {
    fn read_samples(&mut self, buffer: &mut [Sample]) -> RxResult<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }
        self.bytes.resize(buffer.len() * 2, 0);

        loop {
            let offset = usize::from(self.pending.is_some());
            if let Some(b) = self.pending.take() {
                self.bytes[0] = b;
            }

            let n = match self.reader.read(&mut self.bytes[offset..]) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    self.pending = (offset == 1).then_some(self.bytes[0]);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            // A trailing half pair at end of stream is discarded
            if n == 0 {
                return Ok(0);
            }

            let available = offset + n;
            let pairs = available / 2;
            if available % 2 == 1 {
                self.pending = Some(self.bytes[available - 1]);
            }
            if pairs == 0 {
                continue;
            }

            for (sample, pair) in buffer.iter_mut().zip(self.bytes[..pairs * 2].chunks_exact(2)) {
                *sample = Sample::new(u8_to_f32(pair[0]), u8_to_f32(pair[1]));
            }
            return Ok(pairs);
        }
    }
}
