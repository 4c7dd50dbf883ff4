//! Port traits (interfaces)
//!
//! These traits define the boundaries between the receiver core and external I/O.
//! Adapters implement these traits to connect to real sample streams and decoders.

pub mod frames;
pub mod iq;

pub use frames::*;
pub use iq::*;
