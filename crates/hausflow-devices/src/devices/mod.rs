/*!
 * Device adapter implementations for Hausflow.
 *
 * One adapter exists per configured device, chosen by the descriptor's kind.
 */
use std::sync::Arc;

use hausflow_core::types::{DeviceDescriptor, DeviceKind};

use crate::device::Device;
use crate::registry::AdapterContext;

pub mod clipsal;
pub mod daikin;
pub mod generic;

pub use clipsal::ClipsalLight;
pub use daikin::DaikinAc;
pub use generic::GenericDevice;

/// Build the adapter serving `descriptor`
pub fn create_adapter(descriptor: DeviceDescriptor, ctx: &AdapterContext) -> Arc<dyn Device> {
    match descriptor.kind {
        DeviceKind::ClipsalLight => Arc::new(ClipsalLight::new(
            descriptor,
            ctx.beacons.clone(),
            ctx.changes.clone(),
        )),
        DeviceKind::DaikinAcWifi => Arc::new(DaikinAc::new(
            descriptor,
            ctx.ac_hosts.clone(),
            ctx.http.clone(),
        )),
        DeviceKind::Garage | DeviceKind::Unknown => Arc::new(GenericDevice::new(descriptor)),
    }
}
