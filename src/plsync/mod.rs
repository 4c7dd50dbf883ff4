//! DVB-S2 physical-layer synchronization
//!
//! - `plheader` - SOF/PLSC coding and header correlation
//! - `scrambler` - Gold-sequence PL scrambling
//! - `frame_sync` - header acquisition and frame tracking
//! - `carrier` - frequency and phase recovery per frame
//! - `emitter` - descrambling and pilot removal
//! - `framer` - transmit-side PLFRAME builder
//! - `receiver` - the complete chain from samples to frames

pub mod carrier;
pub mod emitter;
pub mod frame_sync;
pub mod framer;
pub mod plheader;
pub mod receiver;
pub mod scrambler;

pub use frame_sync::{FrameSync, SyncState, SyncedFrame};
pub use framer::PlFramer;
pub use receiver::{Diagnostics, Receiver, ReceiverStats};
pub use scrambler::PlScrambler;
