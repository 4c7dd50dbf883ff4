//! DVB-S2 Receiver Synchronization Engine
//!
//! Recovers symbol timing, PLFRAME alignment and carrier phase from a complex
//! baseband sample stream and hands descrambled, pilot-free frames to a
//! downstream FEC decoder.
//!
//! ## Architecture (Hexagonal / Ports & Adapters)
//!
//! - `domain/` - Pure domain types, no I/O dependencies
//! - `dsp/` - Signal processing blocks (AGC, RRC, symbol sync, NCO, FFT)
//! - `plsync/` - Physical-layer framing: header detection, frame tracking,
//!   carrier recovery, descrambling
//! - `ports/` - Trait definitions for sample sources and frame sinks
//! - `adapters/` - Implementations of ports (u8 IQ files, frame writers,
//!   in-memory buffers)
//! - `pipeline` - Threaded source → receiver → sink driver

// Core domain (pure, no I/O)
pub mod domain;
pub mod dsp;
pub mod plsync;
pub mod ports;

// Adapters (external I/O)
pub mod adapters;

pub mod pipeline;

pub use domain::{PlFrame, ReceiverConfig, RxError, RxResult, Sample};
pub use plsync::{Receiver, ReceiverStats};
