//! Frame output adapter
//!
//! Writes recovered frames to any byte stream, either as raw interleaved
//! little-endian f32 payload symbols for a downstream decoder, or as one JSON
//! record per line.

use std::io::Write;

use serde::Serialize;

use crate::domain::{FrameSize, PlFrame, RxResult};
use crate::ports::FrameSink;

/// Output encoding of a `FrameWriter`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Payload only: I and Q as little-endian f32, symbol after symbol
    Raw,
    /// One JSON object per frame and line
    JsonLines,
}

/// JSON line for one frame
#[derive(Debug, Serialize)]
struct FrameRecord {
    start: u64,
    modcod: String,
    frame_size: FrameSize,
    pilots: bool,
    payload: Vec<[f32; 2]>,
}

/// `FrameSink` writing frames to a `Write`
pub struct FrameWriter<W: Write> {
    writer: W,
    format: FrameFormat,
    frames: u64,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W, format: FrameFormat) -> Self {
        Self {
            writer,
            format,
            frames: 0,
        }
    }

    /// Frames written so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameSink for FrameWriter<W> {
    fn write_frame(&mut self, frame: &PlFrame) -> RxResult<()> {
        match self.format {
            FrameFormat::Raw => {
                let mut bytes = Vec::with_capacity(frame.payload.len() * 8);
                for s in &frame.payload {
                    bytes.extend_from_slice(&s.re.to_le_bytes());
                    bytes.extend_from_slice(&s.im.to_le_bytes());
                }
                self.writer.write_all(&bytes)?;
            }
            FrameFormat::JsonLines => {
                let record = FrameRecord {
                    start: frame.start,
                    modcod: frame.modcod().to_string(),
                    frame_size: frame.pls.frame_size,
                    pilots: frame.pls.pilots,
                    payload: frame.payload.iter().map(|s| [s.re, s.im]).collect(),
                };
                serde_json::to_writer(&mut self.writer, &record)?;
                self.writer.write_all(b"\n")?;
            }
        }
        self.frames += 1;
        Ok(())
    }

    fn flush(&mut self) -> RxResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Modcod, PlsCode, Sample};

    fn frame() -> PlFrame {
        PlFrame {
            start: 90,
            pls: PlsCode::new(Modcod::new(4), FrameSize::Short, true),
            payload: vec![Sample::new(0.5, -0.25), Sample::new(-1.0, 2.0)],
        }
    }

    #[test]
    fn raw_format_is_interleaved_little_endian() {
        let mut writer = FrameWriter::new(Vec::new(), FrameFormat::Raw);
        writer.write_frame(&frame()).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-0.25f32).to_le_bytes());
        assert_eq!(&bytes[12..16], &2.0f32.to_le_bytes());
    }

    #[test]
    fn json_lines_carry_frame_metadata() {
        let mut writer = FrameWriter::new(Vec::new(), FrameFormat::JsonLines);
        writer.write_frame(&frame()).unwrap();
        writer.write_frame(&frame()).unwrap();
        assert_eq!(writer.frames(), 2);

        let text = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["start"], 90);
        assert_eq!(value["modcod"], "QPSK1/2");
        assert_eq!(value["frame_size"], "short");
        assert_eq!(value["pilots"], true);
        assert_eq!(value["payload"][1][0], -1.0);
    }
}
