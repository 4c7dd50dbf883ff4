//! Adapters: implementations of the port traits

pub mod frame_writer;
pub mod memory;
pub mod u8_iq;

pub use frame_writer::{FrameFormat, FrameWriter};
pub use memory::{FrameCollector, MemoryIqSource};
pub use u8_iq::U8IqReader;
