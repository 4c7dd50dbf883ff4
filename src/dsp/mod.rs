//! Digital Signal Processing
//!
//! Sample-rate stages of the receiver. No I/O dependencies.

pub mod agc;
pub mod fft;
pub mod nco;
pub mod rrc;
pub mod symbol_sync;

// Re-export commonly used items
pub use agc::Agc;
pub use fft::FftProcessor;
pub use nco::Nco;
pub use rrc::{MatchedFilter, RrcFilterBank};
pub use symbol_sync::SymbolSync;
