//! Core domain types
//!
//! Pure types with no I/O dependencies: configuration, errors, PLFRAME
//! signalling and the frames handed to downstream FEC decoding.

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;
