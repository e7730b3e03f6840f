/*!
 * Core types for Hausflow.
 *
 * This module defines the data model shared by the device adapters, the
 * registry and the smart-home bridge: physical addresses, device
 * descriptors, device state, commands and change events.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Prefix used by the assistant protocol for command names
pub const COMMAND_PREFIX: &str = "action.devices.commands.";

/// A 6-byte hardware identifier, rendered as `aa:bb:cc:dd:ee:ff`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Length of an address in bytes
    pub const LEN: usize = 6;

    /// Create an address from raw bytes
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Create an address from the first six bytes of a slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; 6] = bytes
            .get(..Self::LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                Error::invalid_value(format!("address needs {} bytes, got {}", Self::LEN, bytes.len()))
            })?;
        Ok(Self(raw))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({self})")
    }
}

/// Accepts `aa:bb:cc:dd:ee:ff`, `AA-BB-...` and bare `aabbccddeeff`.
impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        if hex.len() != Self::LEN * 2 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid_value(format!("invalid physical address: {s:?}")));
        }

        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::invalid_value(format!("invalid physical address: {s:?}")))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Vendor/class tag of a configured device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    /// Clipsal-style switch/dimmer reporting over beacons
    ClipsalLight,
    /// Daikin-style networked air conditioner
    DaikinAcWifi,
    /// Garage door opener (no adapter yet, served by the generic stub)
    Garage,
    /// Anything else
    #[serde(other)]
    Unknown,
}

/// Static configuration for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Physical address, also the public device id
    pub mac: MacAddress,
    /// Vendor/class tag
    #[serde(alias = "type")]
    pub kind: DeviceKind,
    /// Display name
    #[serde(default)]
    pub name: String,
}

impl DeviceDescriptor {
    /// Create a new descriptor
    pub fn new(mac: MacAddress, kind: DeviceKind, name: impl Into<String>) -> Self {
        Self {
            mac,
            kind,
            name: name.into(),
        }
    }

    /// Display name, falling back to the address
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.mac.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// Error codes understood by the assistant protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// Unknown id or unreachable device
    DeviceNotFound,
    /// Unknown id inside a batched request
    UnableToLocateDevice,
    /// Command not implemented by the device class
    FunctionNotSupported,
    /// Device rejected a well-formed request; the caller may retry
    TransientError,
    /// Unrecoverable device fault
    HardError,
    /// Unknown top-level intent
    NotSupported,
}

impl ErrorCode {
    /// Wire name of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DeviceNotFound => "deviceNotFound",
            ErrorCode::UnableToLocateDevice => "unableToLocateDevice",
            ErrorCode::FunctionNotSupported => "functionNotSupported",
            ErrorCode::TransientError => "transientError",
            ErrorCode::HardError => "hardError",
            ErrorCode::NotSupported => "notSupported",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thermostat operating modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThermostatMode {
    /// Off mode
    #[serde(rename = "off")]
    Off,
    /// Powered on in the last used mode
    #[serde(rename = "on")]
    On,
    /// Heat mode
    #[serde(rename = "heat")]
    Heat,
    /// Cool mode
    #[serde(rename = "cool")]
    Cool,
    /// Heating or cooling as needed
    #[serde(rename = "heatcool")]
    HeatCool,
    /// Auto mode
    #[serde(rename = "auto")]
    Auto,
    /// Dehumidify
    #[serde(rename = "dry")]
    Dry,
    /// Fan only mode
    #[serde(rename = "fan-only")]
    FanOnly,
}

impl ThermostatMode {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            ThermostatMode::Off => "off",
            ThermostatMode::On => "on",
            ThermostatMode::Heat => "heat",
            ThermostatMode::Cool => "cool",
            ThermostatMode::HeatCool => "heatcool",
            ThermostatMode::Auto => "auto",
            ThermostatMode::Dry => "dry",
            ThermostatMode::FanOnly => "fan-only",
        }
    }
}

impl FromStr for ThermostatMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "off" => Ok(ThermostatMode::Off),
            "on" => Ok(ThermostatMode::On),
            "heat" => Ok(ThermostatMode::Heat),
            "cool" => Ok(ThermostatMode::Cool),
            "heatcool" => Ok(ThermostatMode::HeatCool),
            "auto" => Ok(ThermostatMode::Auto),
            "dry" => Ok(ThermostatMode::Dry),
            "fan-only" => Ok(ThermostatMode::FanOnly),
            _ => Err(Error::invalid_value(format!("Invalid thermostat mode: {s}"))),
        }
    }
}

impl fmt::Display for ThermostatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a device as reported to the assistant.
///
/// Only `online` is always present. When `online` is false every other
/// field is stale or unknown and is omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    /// Whether the device is reachable
    pub online: bool,
    /// Power state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    /// Brightness, 0-255
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    /// Thermostat mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermostat_mode: Option<ThermostatMode>,
    /// Ambient temperature in Celsius
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermostat_temperature_ambient: Option<f64>,
    /// Single setpoint in Celsius
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermostat_temperature_setpoint: Option<f64>,
    /// Lower bound of a setpoint range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermostat_temperature_setpoint_low: Option<f64>,
    /// Upper bound of a setpoint range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermostat_temperature_setpoint_high: Option<f64>,
    /// Named fan speed, e.g. `speed_auto`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_fan_speed_setting: Option<String>,
    /// Error raised while computing or applying this state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl DeviceState {
    /// `{online: false}`
    pub fn offline() -> Self {
        Self::default()
    }

    /// `{online: true}` with nothing else known
    pub fn online() -> Self {
        Self {
            online: true,
            ..Self::default()
        }
    }

    /// An online device that refused the request with `code`
    pub fn failed(code: ErrorCode) -> Self {
        Self {
            online: true,
            error_code: Some(code),
            ..Self::default()
        }
    }
}

/// One command as it arrives on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Command name, e.g. `action.devices.commands.OnOff`
    pub command: String,
    /// Command parameters
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Execution {
    /// Create a new execution
    pub fn new(command: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            command: command.into(),
            params,
        }
    }
}

/// A decoded command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Switch power
    OnOff {
        /// Desired power state
        on: bool,
    },
    /// Absolute brightness, 0-255
    BrightnessAbsolute {
        /// Desired brightness
        brightness: u8,
    },
    /// Single thermostat setpoint
    ThermostatTemperatureSetpoint {
        /// Setpoint in Celsius
        setpoint: f64,
    },
    /// Thermostat setpoint range
    ThermostatTemperatureSetRange {
        /// Lower bound in Celsius
        low: f64,
        /// Upper bound in Celsius
        high: f64,
    },
    /// Thermostat mode by name
    ThermostatSetMode {
        /// Mode name as sent by the assistant
        mode: String,
    },
    /// Named fan speed
    SetFanSpeed {
        /// Speed name, e.g. `speed_quiet`
        fan_speed: String,
    },
    /// Anything this gateway does not understand, including known commands
    /// with missing parameters
    Unsupported(String),
}

impl Command {
    /// Short command name, without the protocol prefix
    pub fn name(&self) -> &str {
        match self {
            Command::OnOff { .. } => "OnOff",
            Command::BrightnessAbsolute { .. } => "BrightnessAbsolute",
            Command::ThermostatTemperatureSetpoint { .. } => "ThermostatTemperatureSetpoint",
            Command::ThermostatTemperatureSetRange { .. } => "ThermostatTemperatureSetRange",
            Command::ThermostatSetMode { .. } => "ThermostatSetMode",
            Command::SetFanSpeed { .. } => "SetFanSpeed",
            Command::Unsupported(name) => name,
        }
    }
}

impl From<&Execution> for Command {
    fn from(exec: &Execution) -> Self {
        let name = exec.command.strip_prefix(COMMAND_PREFIX).unwrap_or(&exec.command);
        let params = &exec.params;
        let number = |key: &str| params.get(key).and_then(Value::as_f64);
        let string = |key: &str| params.get(key).and_then(Value::as_str).map(str::to_string);

        let command = match name {
            "OnOff" => Some(Command::OnOff {
                on: params.get("on").map(truthy).unwrap_or(false),
            }),
            "BrightnessAbsolute" => number("brightness").map(|b| Command::BrightnessAbsolute {
                brightness: b.clamp(0.0, 255.0).round() as u8,
            }),
            "ThermostatTemperatureSetpoint" => number("thermostatTemperatureSetpoint")
                .map(|setpoint| Command::ThermostatTemperatureSetpoint { setpoint }),
            "ThermostatTemperatureSetRange" => number("thermostatTemperatureSetpointLow")
                .zip(number("thermostatTemperatureSetpointHigh"))
                .map(|(low, high)| Command::ThermostatTemperatureSetRange { low, high }),
            "ThermostatSetMode" => {
                string("thermostatMode").map(|mode| Command::ThermostatSetMode { mode })
            }
            "SetFanSpeed" => string("fanSpeed").map(|fan_speed| Command::SetFanSpeed { fan_speed }),
            _ => None,
        };

        command.unwrap_or_else(|| Command::Unsupported(name.to_string()))
    }
}

impl From<Execution> for Command {
    fn from(exec: Execution) -> Self {
        Command::from(&exec)
    }
}

/// Loose truthiness for JSON parameters: `true`, non-zero numbers and
/// non-empty strings count as set.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A state observation published by the registry
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Device address
    pub id: MacAddress,
    /// State computed right after the observation
    pub state: DeviceState,
    /// Whether the observation changed the device (including the first one
    /// after being offline)
    pub is_change: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mac_display_and_parse() {
        let mac = MacAddress::new([0x00, 0x0d, 0x6f, 0xc6, 0xaa, 0xf5]);
        assert_eq!(mac.to_string(), "00:0d:6f:c6:aa:f5");
        assert_eq!("00:0D:6F:C6:AA:F5".parse::<MacAddress>().unwrap(), mac);
        assert_eq!("000d6fc6aaf5".parse::<MacAddress>().unwrap(), mac);
        assert!("00:0d:6f".parse::<MacAddress>().is_err());
        assert!("zz:0d:6f:c6:aa:f5".parse::<MacAddress>().is_err());
        assert!("+a+b+c+d+e+f".parse::<MacAddress>().is_err());
        assert!("+a:+b:+c:+d:+e:+f".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_mac_from_slice() {
        let mac = MacAddress::from_slice(&[1, 2, 3, 4, 5, 6, 7]).unwrap();
        assert_eq!(mac.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert!(MacAddress::from_slice(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_descriptor_deserialize() {
        let raw = json!({"mac": "00:0D:6F:C6:AA:F5", "type": "clipsal-light", "name": "Ensuite"});
        let descriptor: DeviceDescriptor = serde_json::from_value(raw).unwrap();
        assert_eq!(descriptor.kind, DeviceKind::ClipsalLight);
        assert_eq!(descriptor.mac.to_string(), "00:0d:6f:c6:aa:f5");

        let raw = json!({"mac": "000d6fc6aaf5", "kind": "toaster"});
        let descriptor: DeviceDescriptor = serde_json::from_value(raw).unwrap();
        assert_eq!(descriptor.kind, DeviceKind::Unknown);
        assert_eq!(descriptor.display_name(), "00:0d:6f:c6:aa:f5");
    }

    #[test]
    fn test_offline_state_serializes_alone() {
        let value = serde_json::to_value(DeviceState::offline()).unwrap();
        assert_eq!(value, json!({"online": false}));
    }

    #[test]
    fn test_state_field_names() {
        let state = DeviceState {
            online: true,
            on: Some(true),
            thermostat_mode: Some(ThermostatMode::FanOnly),
            thermostat_temperature_setpoint_low: Some(21.5),
            current_fan_speed_setting: Some("speed_auto".into()),
            error_code: Some(ErrorCode::TransientError),
            ..DeviceState::default()
        };
        let value = serde_json::to_value(state).unwrap();
        assert_eq!(
            value,
            json!({
                "online": true,
                "on": true,
                "thermostatMode": "fan-only",
                "thermostatTemperatureSetpointLow": 21.5,
                "currentFanSpeedSetting": "speed_auto",
                "errorCode": "transientError",
            })
        );
    }

    #[test]
    fn test_command_parsing() {
        let exec = Execution::new("action.devices.commands.OnOff", json!({"on": true}));
        assert_eq!(Command::from(&exec), Command::OnOff { on: true });

        let exec = Execution::new("BrightnessAbsolute", json!({"brightness": 300}));
        assert_eq!(Command::from(&exec), Command::BrightnessAbsolute { brightness: 255 });

        let exec = Execution::new(
            "action.devices.commands.ThermostatTemperatureSetRange",
            json!({"thermostatTemperatureSetpointLow": 20, "thermostatTemperatureSetpointHigh": 23}),
        );
        assert_eq!(
            Command::from(&exec),
            Command::ThermostatTemperatureSetRange { low: 20.0, high: 23.0 }
        );

        let exec = Execution::new("action.devices.commands.OpenClose", json!({"openPercent": 100}));
        assert_eq!(Command::from(&exec), Command::Unsupported("OpenClose".into()));

        let exec = Execution::new("action.devices.commands.ThermostatSetMode", json!({}));
        assert_eq!(Command::from(&exec).name(), "ThermostatSetMode");
    }

    #[test]
    fn test_thermostat_mode_from_str() {
        assert_eq!("Fan-Only".parse::<ThermostatMode>().unwrap(), ThermostatMode::FanOnly);
        assert!("turbo".parse::<ThermostatMode>().is_err());
    }
}
