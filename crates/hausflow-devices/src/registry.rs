/*!
 * Device registry for Hausflow.
 *
 * The registry is built once from the configured device list and is the only
 * place that maps a physical address to its adapter. It routes beacon frames
 * to adapters and publishes every accepted update on the change bus.
 */
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use hausflow_core::event::{EventBus, Subscription};
use hausflow_core::types::{ChangeEvent, Command, DeviceDescriptor, DeviceState, MacAddress};

use crate::beacon::{BeaconSink, FRAME_LEN};
use crate::device::{Device, DeviceError, Result};
use crate::devices::create_adapter;
use crate::discovery::AcHostTable;

/// Shared resources handed to adapters when they are created
#[derive(Debug, Clone)]
pub struct AdapterContext {
    /// Outbound beacon path
    pub beacons: Arc<dyn BeaconSink>,
    /// Registry-wide change bus
    pub changes: EventBus<ChangeEvent>,
    /// Address to host table for networked ACs
    pub ac_hosts: AcHostTable,
    /// HTTP client for networked devices
    pub http: reqwest::Client,
}

impl AdapterContext {
    /// Create a context with a fresh change bus and host table
    pub fn new(beacons: Arc<dyn BeaconSink>, http: reqwest::Client) -> Self {
        Self {
            beacons,
            changes: EventBus::new(),
            ac_hosts: AcHostTable::new(),
            http,
        }
    }
}

/// Device registry
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: HashMap<MacAddress, Arc<dyn Device>>,
    descriptors: Vec<DeviceDescriptor>,
    changes: EventBus<ChangeEvent>,
}

impl DeviceRegistry {
    /// Build one adapter per descriptor. A repeated address replaces the
    /// earlier entry.
    pub fn new(descriptors: Vec<DeviceDescriptor>, ctx: &AdapterContext) -> Self {
        let adapters = descriptors
            .into_iter()
            .map(|descriptor| create_adapter(descriptor, ctx))
            .collect();
        Self::from_adapters(adapters, ctx.changes.clone())
    }

    /// Build a registry from ready-made adapters publishing on `changes`
    pub fn from_adapters(adapters: Vec<Arc<dyn Device>>, changes: EventBus<ChangeEvent>) -> Self {
        let mut devices: HashMap<MacAddress, Arc<dyn Device>> = HashMap::new();
        let mut descriptors: Vec<DeviceDescriptor> = Vec::with_capacity(adapters.len());

        for adapter in adapters {
            let descriptor = adapter.descriptor().clone();
            if devices.contains_key(&descriptor.mac) {
                warn!("Device {} registered twice, replacing", descriptor.mac);
                descriptors.retain(|d| d.mac != descriptor.mac);
            }
            debug!("Registering {:?} device {}", descriptor.kind, descriptor.mac);
            devices.insert(descriptor.mac, adapter);
            descriptors.push(descriptor);
        }

        info!("Device registry holds {} devices", devices.len());
        Self {
            devices,
            descriptors,
            changes,
        }
    }

    /// Route one beacon frame to its adapter
    pub fn ingest_beacon_frame(&self, frame: &[u8]) {
        if frame.len() != FRAME_LEN {
            warn!("Dropping beacon frame of {} bytes", frame.len());
            return;
        }

        let (address, payload) = frame.split_at(MacAddress::LEN);
        let id = match MacAddress::from_slice(address) {
            Ok(id) => id,
            Err(e) => {
                warn!("Dropping beacon frame: {}", e);
                return;
            }
        };

        let Some(device) = self.devices.get(&id) else {
            debug!("Dropping beacon frame for unknown device {}", id);
            return;
        };

        match device.on_beacon_update(payload) {
            Ok(update) => {
                if update.changed {
                    debug!("Device {} changed: {:?}", id, update.state);
                }
                self.changes.publish(ChangeEvent {
                    id,
                    state: update.state,
                    is_change: update.changed,
                });
            }
            Err(e) => {
                warn!("Dropping beacon frame for {}: {}", id, e);
            }
        }
    }

    /// Look up an adapter
    pub fn get(&self, id: &MacAddress) -> Option<Arc<dyn Device>> {
        self.devices.get(id).cloned()
    }

    /// Whether `id` is a configured device
    pub fn contains(&self, id: &MacAddress) -> bool {
        self.devices.contains_key(id)
    }

    /// Current state of a device
    pub async fn get_state(&self, id: &MacAddress) -> Result<DeviceState> {
        self.device(id)?.state().await
    }

    /// Apply commands to a device, returning the adapter's result verbatim
    pub async fn execute(&self, id: &MacAddress, commands: &[Command]) -> Result<DeviceState> {
        self.device(id)?.execute(commands).await
    }

    /// Subscribe to change events. Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> Subscription<ChangeEvent> {
        self.changes.subscribe()
    }

    /// The change bus itself
    pub fn changes(&self) -> &EventBus<ChangeEvent> {
        &self.changes
    }

    /// Configured devices in configuration order
    pub fn descriptors(&self) -> &[DeviceDescriptor] {
        &self.descriptors
    }

    /// Number of configured devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is configured
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn device(&self, id: &MacAddress) -> Result<Arc<dyn Device>> {
        self.get(id)
            .ok_or_else(|| DeviceError::NotFound(format!("unknown device {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::ConnectionSet;
    use crate::devices::clipsal::LIGHT_BEACON_TYPE;
    use hausflow_core::types::{DeviceKind, ErrorCode};
    use std::time::Duration;

    const LIGHT: MacAddress = MacAddress::new([0x00, 0x0d, 0x6f, 0xc6, 0xaa, 0xf5]);
    const GARAGE: MacAddress = MacAddress::new([0x00, 0x0d, 0x6f, 0x00, 0x00, 0x01]);

    fn registry() -> DeviceRegistry {
        let ctx = AdapterContext::new(Arc::new(ConnectionSet::new()), reqwest::Client::new());
        DeviceRegistry::new(
            vec![
                DeviceDescriptor::new(LIGHT, DeviceKind::ClipsalLight, "Ensuite"),
                DeviceDescriptor::new(GARAGE, DeviceKind::Garage, "Garage"),
            ],
            &ctx,
        )
    }

    fn frame(mac: MacAddress, tag: u8, on: bool, brightness: u8) -> Vec<u8> {
        let mut frame = mac.as_bytes().to_vec();
        frame.extend_from_slice(&[tag, u8::from(on), brightness, 0, 0, 0, 0, 0, 0]);
        frame
    }

    #[tokio::test]
    async fn test_ingest_publishes_changes() {
        let registry = registry();
        let mut sub = registry.subscribe();

        registry.ingest_beacon_frame(&frame(LIGHT, LIGHT_BEACON_TYPE, true, 90));
        registry.ingest_beacon_frame(&frame(LIGHT, LIGHT_BEACON_TYPE, true, 90));

        let first = sub.recv().await.unwrap();
        assert_eq!(first.id, LIGHT);
        assert!(first.is_change);
        assert_eq!(first.state.brightness, Some(90));

        let second = sub.recv().await.unwrap();
        assert!(!second.is_change);

        let state = registry.get_state(&LIGHT).await.unwrap();
        assert_eq!(state.on, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_drops_bad_frames() {
        let registry = registry();
        let mut sub = registry.subscribe();

        // Wrong length, unknown device, wrong class tag, adapter without beacons.
        registry.ingest_beacon_frame(&[0u8; 15]);
        registry.ingest_beacon_frame(&frame(MacAddress::new([7; 6]), LIGHT_BEACON_TYPE, true, 1));
        registry.ingest_beacon_frame(&frame(LIGHT, 0x11, true, 1));
        registry.ingest_beacon_frame(&frame(GARAGE, LIGHT_BEACON_TYPE, true, 1));

        let received = sub.recv_matching(Duration::from_secs(1), |_| true).await;
        assert!(received.is_none());
        assert_eq!(registry.get_state(&LIGHT).await.unwrap(), DeviceState::offline());
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let registry = registry();
        let missing = MacAddress::new([0xff; 6]);

        let err = registry.get_state(&missing).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DeviceNotFound);

        let err = registry
            .execute(&missing, &[Command::OnOff { on: true }])
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DeviceNotFound);
    }

    #[tokio::test]
    async fn test_unknown_kind_uses_generic_stub() {
        let registry = registry();
        assert_eq!(registry.get_state(&GARAGE).await.unwrap(), DeviceState::offline());
        let result = registry.execute(&GARAGE, &[Command::OnOff { on: true }]).await;
        assert_eq!(result.unwrap(), DeviceState::offline());
    }

    #[test]
    fn test_duplicate_descriptor_replaces_earlier() {
        let ctx = AdapterContext::new(Arc::new(ConnectionSet::new()), reqwest::Client::new());
        let registry = DeviceRegistry::new(
            vec![
                DeviceDescriptor::new(LIGHT, DeviceKind::Garage, "Old"),
                DeviceDescriptor::new(GARAGE, DeviceKind::Garage, "Garage"),
                DeviceDescriptor::new(LIGHT, DeviceKind::ClipsalLight, "New"),
            ],
            &ctx,
        );

        assert_eq!(registry.len(), 2);
        let names: Vec<_> = registry.descriptors().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Garage", "New"]);
        assert_eq!(registry.get(&LIGHT).unwrap().descriptor().kind, DeviceKind::ClipsalLight);
    }
}
