/*!
 * Clipsal-style switch/dimmer adapter.
 *
 * These lights report over the beacon transport and are controlled by
 * broadcasting a frame addressed to them. A light is online while its last
 * beacon is at most [`ONLINE_TIMEOUT`] old.
 *
 * Commands are confirmed by waiting for the next beacon that changes the
 * light. That beacon may come from a concurrent change made at the switch
 * itself; the two cannot be told apart.
 */
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use hausflow_core::event::EventBus;
use hausflow_core::types::{ChangeEvent, Command, DeviceDescriptor, DeviceState, ErrorCode, MacAddress};

use crate::beacon::{BeaconSink, FRAME_LEN};
use crate::device::{BeaconUpdate, Device, DeviceError, Result};

/// Class tag carried in byte 6 of every light frame
pub const LIGHT_BEACON_TYPE: u8 = 0x55;

/// How long a light stays online after its last beacon
pub const ONLINE_TIMEOUT: Duration = Duration::from_secs(60);

/// How long `execute` waits for a confirming beacon
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// Length of the class payload following the address
pub const PAYLOAD_LEN: usize = FRAME_LEN - MacAddress::LEN;

/// Length of the command payload written after the address
pub const COMMAND_PAYLOAD_LEN: usize = 10;

/// Byte value asking the light to leave a field as it is
pub const UNCHANGED: u8 = 255;

#[derive(Debug, Default)]
struct LightState {
    is_on: bool,
    brightness: u8,
    last_seen: Option<Instant>,
}

impl LightState {
    fn is_online(&self, now: Instant) -> bool {
        self.last_seen
            .map_or(false, |seen| now.saturating_duration_since(seen) <= ONLINE_TIMEOUT)
    }

    fn snapshot(&self, now: Instant) -> DeviceState {
        if !self.is_online(now) {
            return DeviceState::offline();
        }
        DeviceState {
            online: true,
            on: Some(self.is_on),
            brightness: Some(self.brightness),
            ..DeviceState::default()
        }
    }
}

/// Decode `(on, brightness)` from a class payload
pub fn decode_payload(payload: &[u8]) -> Result<(bool, u8)> {
    match payload {
        [LIGHT_BEACON_TYPE, on, brightness, ..] => Ok((*on != 0, *brightness)),
        [LIGHT_BEACON_TYPE, ..] => Err(DeviceError::Protocol(format!(
            "light beacon payload too short: {} bytes",
            payload.len()
        ))),
        [tag, ..] => Err(DeviceError::Protocol(format!(
            "expected light beacon type {:#04x}, got {:#04x}",
            LIGHT_BEACON_TYPE, tag
        ))),
        [] => Err(DeviceError::Protocol("empty light beacon payload".to_string())),
    }
}

/// Encode commands into a command payload.
///
/// Fields no command touches are left at [`UNCHANGED`]. Returns the name of
/// the first command a light cannot perform.
pub fn encode_commands(commands: &[Command]) -> std::result::Result<[u8; COMMAND_PAYLOAD_LEN], String> {
    let mut payload = [0u8; COMMAND_PAYLOAD_LEN];
    payload[0] = LIGHT_BEACON_TYPE;
    payload[1] = UNCHANGED;
    payload[2] = UNCHANGED;

    for command in commands {
        match command {
            Command::OnOff { on } => payload[1] = u8::from(*on),
            Command::BrightnessAbsolute { brightness } => payload[2] = *brightness,
            other => return Err(other.name().to_string()),
        }
    }

    Ok(payload)
}

/// Switch/dimmer reporting over beacons
#[derive(Debug)]
pub struct ClipsalLight {
    descriptor: DeviceDescriptor,
    state: Mutex<LightState>,
    beacons: Arc<dyn BeaconSink>,
    changes: EventBus<ChangeEvent>,
}

impl ClipsalLight {
    /// Create a light writing through `beacons` and confirming on `changes`
    pub fn new(
        descriptor: DeviceDescriptor,
        beacons: Arc<dyn BeaconSink>,
        changes: EventBus<ChangeEvent>,
    ) -> Self {
        Self {
            descriptor,
            state: Mutex::new(LightState::default()),
            beacons,
            changes,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LightState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current(&self) -> DeviceState {
        self.lock().snapshot(Instant::now())
    }
}

#[async_trait]
impl Device for ClipsalLight {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn on_beacon_update(&self, payload: &[u8]) -> Result<BeaconUpdate> {
        let (is_on, brightness) = decode_payload(payload)?;
        let now = Instant::now();

        let mut light = self.lock();
        // Coming back from an offline gap counts as a first observation.
        let first = !light.is_online(now);
        light.last_seen = Some(now);

        let changed = first || light.is_on != is_on || light.brightness != brightness;
        light.is_on = is_on;
        light.brightness = brightness;

        Ok(BeaconUpdate {
            state: light.snapshot(now),
            changed,
        })
    }

    async fn state(&self) -> Result<DeviceState> {
        Ok(self.current())
    }

    async fn execute(&self, commands: &[Command]) -> Result<DeviceState> {
        let payload = match encode_commands(commands) {
            Ok(payload) => payload,
            Err(name) => {
                warn!("Light {} cannot perform {}", self.descriptor.mac, name);
                return Ok(DeviceState::failed(ErrorCode::FunctionNotSupported));
            }
        };

        let id = self.id();
        let mut frame = [0u8; MacAddress::LEN + COMMAND_PAYLOAD_LEN];
        frame[..MacAddress::LEN].copy_from_slice(id.as_bytes());
        frame[MacAddress::LEN..].copy_from_slice(&payload);

        // Subscribe first so a fast confirmation is not missed.
        let mut confirmations = self.changes.subscribe();
        if self.beacons.broadcast(&frame) == 0 {
            debug!("No beacon relay connected, light {} is unreachable", id);
            return Ok(DeviceState::offline());
        }

        match confirmations
            .recv_matching(CONFIRM_TIMEOUT, |event| event.id == id && event.is_change)
            .await
        {
            Some(event) => Ok(event.state),
            None => {
                debug!("No confirmation from light {} within {:?}", id, CONFIRM_TIMEOUT);
                Ok(self.current())
            }
        }
    }
}
