/*!
 * Public device shapes advertised in SYNC responses.
 */
use serde::Serialize;
use serde_json::{json, Map, Value};

use hausflow_core::types::{DeviceDescriptor, DeviceKind};

const TRAIT_ON_OFF: &str = "action.devices.traits.OnOff";
const TRAIT_BRIGHTNESS: &str = "action.devices.traits.Brightness";
const TRAIT_TEMPERATURE_SETTING: &str = "action.devices.traits.TemperatureSetting";
const TRAIT_FAN_SPEED: &str = "action.devices.traits.FanSpeed";
const TRAIT_OPEN_CLOSE: &str = "action.devices.traits.OpenClose";

/// A device as advertised to the assistant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDevice {
    /// Device id (the physical address)
    pub id: String,
    /// Device type, empty for unknown kinds
    #[serde(rename = "type")]
    pub device_type: String,
    /// Capability traits
    pub traits: Vec<String>,
    /// Whether state changes are pushed to the reporting endpoint
    pub will_report_state: bool,
    /// Trait attributes
    pub attributes: Map<String, Value>,
    /// Manufacturer details
    pub device_info: DeviceInfo,
    /// Display names
    pub name: DeviceName,
}

/// Manufacturer details
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Manufacturer name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Model name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Display names
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceName {
    /// Primary name
    pub name: String,
    /// Alternative names
    pub nicknames: Vec<String>,
}

/// Convert a configured device into its advertised shape
pub fn sync_device(descriptor: &DeviceDescriptor) -> SyncDevice {
    let name = descriptor.display_name();
    let mut device = SyncDevice {
        id: descriptor.mac.to_string(),
        device_type: String::new(),
        traits: Vec::new(),
        will_report_state: false,
        attributes: Map::new(),
        device_info: DeviceInfo::default(),
        name: DeviceName {
            name: name.clone(),
            nicknames: Vec::new(),
        },
    };

    match descriptor.kind {
        DeviceKind::ClipsalLight => {
            device.device_type = "action.devices.types.LIGHT".into();
            device.traits = traits(&[TRAIT_ON_OFF, TRAIT_BRIGHTNESS]);
            device.will_report_state = true;
            device.device_info = info("Clipsal", "Smart Light");
            device.name.nicknames.push(format!("{name} Light"));
        }
        DeviceKind::DaikinAcWifi => {
            device.device_type = "action.devices.types.AC_UNIT".into();
            device.traits = traits(&[TRAIT_ON_OFF, TRAIT_TEMPERATURE_SETTING, TRAIT_FAN_SPEED]);
            device.attributes = ac_attributes();
            device.device_info = info("Daikin", "AC Wifi");
            device.name.nicknames.push(format!("{name} AC"));
        }
        DeviceKind::Garage => {
            device.device_type = "action.devices.types.GARAGE".into();
            device.traits = traits(&[TRAIT_OPEN_CLOSE]);
            device.device_info = info("Smart Door Devices", "Opener");
            device.name.nicknames.push(format!("{name} Door"));
        }
        DeviceKind::Unknown => {}
    }

    device
}

fn traits(names: &[&str]) -> Vec<String> {
    names.iter().map(|t| t.to_string()).collect()
}

fn info(manufacturer: &str, model: &str) -> DeviceInfo {
    DeviceInfo {
        manufacturer: Some(manufacturer.to_string()),
        model: Some(model.to_string()),
    }
}

fn ac_attributes() -> Map<String, Value> {
    let attributes = json!({
        "availableThermostatModes": ["heat", "cool", "auto", "fan-only"],
        "thermostatTemperatureUnit": "C",
        "thermostatTemperatureRange": {
            "minThresholdCelsius": 19,
            "maxThresholdCelsius": 25,
        },
        "availableFanSpeeds": {
            "ordered": true,
            "supportsFanSpeedPercent": true,
            "speeds": [
                {
                    "speed_name": "speed_quiet",
                    "speed_values": [{"speed_synonym": ["quiet", "low", "slow"], "lang": "en"}],
                },
                {
                    "speed_name": "speed_auto",
                    "speed_values": [{"speed_synonym": ["auto"], "lang": "en"}],
                },
            ],
        },
    });

    match attributes {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hausflow_core::types::MacAddress;

    const MAC: MacAddress = MacAddress::new([0x00, 0x0d, 0x6f, 0xc6, 0xaa, 0xf5]);

    #[test]
    fn test_light_shape() {
        let device = sync_device(&DeviceDescriptor::new(MAC, DeviceKind::ClipsalLight, "Ensuite"));
        let value = serde_json::to_value(device).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "00:0d:6f:c6:aa:f5",
                "type": "action.devices.types.LIGHT",
                "traits": ["action.devices.traits.OnOff", "action.devices.traits.Brightness"],
                "willReportState": true,
                "attributes": {},
                "deviceInfo": {"manufacturer": "Clipsal", "model": "Smart Light"},
                "name": {"name": "Ensuite", "nicknames": ["Ensuite Light"]},
            })
        );
    }

    #[test]
    fn test_ac_shape() {
        let device = sync_device(&DeviceDescriptor::new(MAC, DeviceKind::DaikinAcWifi, "Lounge"));
        assert_eq!(device.device_type, "action.devices.types.AC_UNIT");
        assert_eq!(device.traits.len(), 3);
        assert!(!device.will_report_state);
        assert_eq!(device.attributes["thermostatTemperatureUnit"], json!("C"));
        assert_eq!(
            device.attributes["thermostatTemperatureRange"]["maxThresholdCelsius"],
            json!(25)
        );
        assert_eq!(device.name.nicknames, ["Lounge AC"]);
    }

    #[test]
    fn test_garage_and_unknown_shapes() {
        let garage = sync_device(&DeviceDescriptor::new(MAC, DeviceKind::Garage, "Main"));
        assert_eq!(garage.traits, [TRAIT_OPEN_CLOSE]);
        assert_eq!(garage.name.nicknames, ["Main Door"]);
        assert_eq!(garage.device_info.manufacturer.as_deref(), Some("Smart Door Devices"));

        let unknown = sync_device(&DeviceDescriptor::new(MAC, DeviceKind::Unknown, ""));
        assert_eq!(unknown.device_type, "");
        assert!(unknown.traits.is_empty());
        assert!(!unknown.will_report_state);
        assert_eq!(unknown.name.name, "00:0d:6f:c6:aa:f5");
        assert_eq!(serde_json::to_value(&unknown.device_info).unwrap(), json!({}));
    }
}
