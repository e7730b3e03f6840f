/*!
 * Hausflow Devices
 *
 * This crate provides the device adapters, the device registry, the beacon
 * transport and discovery of networked air conditioners for the Hausflow
 * gateway.
 */

#![warn(missing_docs)]

// Re-export core types
pub use hausflow_core::prelude;

pub mod beacon;
pub mod device;
pub mod devices;
pub mod discovery;
pub mod protocol;
pub mod registry;

pub use beacon::{BeaconServer, BeaconSink, ConnectionSet, FrameAssembler, FRAME_LEN};
pub use device::{BeaconUpdate, Device, DeviceError};
pub use discovery::{AcDiscovery, AcHostTable};
pub use registry::{AdapterContext, DeviceRegistry};

/// Hausflow devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
