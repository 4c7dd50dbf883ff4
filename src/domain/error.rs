//! Domain error types

use thiserror::Error;

/// Errors that can occur in the receiver
#[derive(Error, Debug)]
pub enum RxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] serde_json::Error),

    /// PLSC signalled pilots but none were found in the frame body
    #[error("Pilot blocks missing from PLFRAME starting at symbol {0}")]
    PilotsMissing(u64),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Result type alias for receiver operations
pub type RxResult<T> = Result<T, RxError>;
