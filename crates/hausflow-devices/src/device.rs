/*!
 * Device trait and core device abstractions.
 *
 * Every configured device is served by one adapter implementing [`Device`].
 * Adapters compute a fresh [`DeviceState`] on every query; the registry owns
 * the adapters and is the only component that maps addresses to them.
 */
use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

use hausflow_core::error::Error as CoreError;
use hausflow_core::types::{Command, DeviceDescriptor, DeviceState, ErrorCode, MacAddress};

/// Error type for device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Unknown id, or the device cannot be reached
    #[error("Device not found: {0}")]
    NotFound(String),

    /// The device class does not implement the command
    #[error("Function not supported: {0}")]
    FunctionNotSupported(String),

    /// The device rejected a well-formed request
    #[error("Transient error: {0}")]
    Transient(String),

    /// The device sent something that violates its protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The adapter does not consume beacon frames
    #[error("Device does not accept beacon updates")]
    BeaconUnsupported,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl DeviceError {
    /// Assistant error code reported for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            DeviceError::NotFound(_) => ErrorCode::DeviceNotFound,
            DeviceError::FunctionNotSupported(_) | DeviceError::BeaconUnsupported => {
                ErrorCode::FunctionNotSupported
            }
            DeviceError::Transient(_) | DeviceError::Io(_) => ErrorCode::TransientError,
            DeviceError::Protocol(_) | DeviceError::Core(_) => ErrorCode::HardError,
        }
    }
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Outcome of feeding one beacon payload to an adapter
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconUpdate {
    /// State computed right after the update
    pub state: DeviceState,
    /// Whether the update changed the device, including the first update
    /// after being offline
    pub changed: bool,
}

/// The core device trait
///
/// `state` and `execute` may perform network I/O. `on_beacon_update` is only
/// implemented by adapters fed from the beacon transport.
#[async_trait]
pub trait Device: Send + Sync + Debug {
    /// Static configuration of this device
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Physical address, also the public id
    fn id(&self) -> MacAddress {
        self.descriptor().mac
    }

    /// Apply a class-specific beacon payload (the frame without its address)
    fn on_beacon_update(&self, _payload: &[u8]) -> Result<BeaconUpdate> {
        Err(DeviceError::BeaconUnsupported)
    }

    /// Compute the current state
    async fn state(&self) -> Result<DeviceState>;

    /// Apply commands in order and return the resulting state
    async fn execute(&self, commands: &[Command]) -> Result<DeviceState>;
}
