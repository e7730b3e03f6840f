/*!
 * Error types for the Hausflow bridge crate.
 */
use thiserror::Error;

/// Error type for bridge operations
#[derive(Error, Debug)]
pub enum Error {
    /// Device error
    #[error("Device error: {0}")]
    Device(#[from] hausflow_devices::DeviceError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] hausflow_core::error::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Outbound HTTP error
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err.to_string())
    }
}
