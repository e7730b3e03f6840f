/*!
 * Placeholder adapter for device classes without an implementation.
 */
use async_trait::async_trait;

use hausflow_core::types::{Command, DeviceDescriptor, DeviceState};

use crate::device::{Device, Result};

/// Adapter that is always offline
#[derive(Debug, Clone)]
pub struct GenericDevice {
    descriptor: DeviceDescriptor,
}

impl GenericDevice {
    /// Create a new generic device
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl Device for GenericDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    async fn state(&self) -> Result<DeviceState> {
        Ok(DeviceState::offline())
    }

    async fn execute(&self, _commands: &[Command]) -> Result<DeviceState> {
        Ok(DeviceState::offline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use hausflow_core::types::{DeviceKind, MacAddress};

    #[tokio::test]
    async fn test_always_offline() {
        let device = GenericDevice::new(DeviceDescriptor::new(
            MacAddress::new([9, 9, 9, 9, 9, 9]),
            DeviceKind::Garage,
            "Garage",
        ));

        assert_eq!(device.state().await.unwrap(), DeviceState::offline());
        let result = device.execute(&[Command::OnOff { on: true }]).await.unwrap();
        assert_eq!(result, DeviceState::offline());
        assert!(matches!(
            device.on_beacon_update(&[0x55, 1, 2]),
            Err(DeviceError::BeaconUnsupported)
        ));
    }
}
