/*!
 * Daikin-style networked air conditioner adapter.
 *
 * Units are located through UDP discovery (see [`crate::discovery`]) and
 * controlled over plain HTTP:
 *
 * - `GET /aircon/get_sensor_info` and `GET /aircon/get_control_info` return
 *   comma-separated `key=value` lists
 * - `POST /aircon/set_control_info` takes the full control set as a form and
 *   answers with `ret=OK` on success
 */
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tracing::{debug, warn};

use hausflow_core::types::{Command, DeviceDescriptor, DeviceState, ErrorCode, ThermostatMode};

use crate::device::{Device, DeviceError, Result};
use crate::discovery::AcHostTable;
use crate::protocol::{numeric_field, parse_values};

/// Control fields that must accompany every control request, with the
/// values used when the unit does not report them
const CONTROL_DEFAULTS: [(&str, &str); 6] = [
    ("pow", "0"),
    ("mode", "0"),
    ("stemp", "20.0"),
    ("shum", "50"),
    ("f_rate", "A"),
    ("f_dir", "0"),
];

/// Mode codes understood by the unit
const MODE_CODES: [(ThermostatMode, u8); 5] = [
    (ThermostatMode::HeatCool, 0),
    (ThermostatMode::Dry, 2),
    (ThermostatMode::Cool, 3),
    (ThermostatMode::Heat, 4),
    (ThermostatMode::FanOnly, 6),
];

const FAN_AUTO: &str = "A";
const FAN_QUIET: &str = "B";

/// Round to the nearest half degree
pub fn round_half_degree(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}

fn format_setpoint(value: f64) -> String {
    format!("{:.1}", round_half_degree(value))
}

fn mode_for_code(code: f64) -> Option<ThermostatMode> {
    MODE_CODES
        .iter()
        .find(|(_, c)| f64::from(*c) == code)
        .map(|(mode, _)| *mode)
}

/// Mode names are matched exactly; any other spelling selects code 0.
fn code_for_mode(name: &str) -> u8 {
    MODE_CODES
        .iter()
        .find(|(mode, _)| mode.as_str() == name)
        .map_or(0, |(_, code)| *code)
}

/// Translate sensor and control values into a device state
pub fn state_from_values(
    sensor: &HashMap<String, String>,
    control: &HashMap<String, String>,
) -> DeviceState {
    let on = control.get("pow").map(String::as_str) != Some("0");

    let mode = if on {
        let code = control
            .get("mode")
            .map(|raw| raw.trim().parse::<f64>().unwrap_or(f64::NAN))
            .unwrap_or(f64::NAN);
        mode_for_code(code).unwrap_or(ThermostatMode::HeatCool)
    } else {
        ThermostatMode::Off
    };

    let mut state = DeviceState {
        online: true,
        on: Some(on),
        thermostat_mode: Some(mode),
        thermostat_temperature_ambient: numeric_field(sensor, "htemp"),
        ..DeviceState::default()
    };

    if let Some(setpoint) = numeric_field(control, "stemp") {
        if mode == ThermostatMode::HeatCool {
            state.thermostat_temperature_setpoint_low = Some(setpoint);
            state.thermostat_temperature_setpoint_high = Some(setpoint);
        } else {
            state.thermostat_temperature_setpoint = Some(setpoint);
        }
    }

    state.current_fan_speed_setting = match control.get("f_rate").map(String::as_str) {
        Some(FAN_AUTO) => Some("speed_auto".to_string()),
        Some(FAN_QUIET) => Some("speed_quiet".to_string()),
        _ => None,
    };

    state
}

/// Merge commands into a full control set, starting from the unit's current
/// values. Fails on the first command an AC cannot perform.
pub fn apply_commands(
    current: &HashMap<String, String>,
    commands: &[Command],
) -> Result<BTreeMap<&'static str, String>> {
    let mut values: BTreeMap<&'static str, String> = CONTROL_DEFAULTS
        .iter()
        .map(|(key, default)| {
            let value = current.get(*key).cloned().unwrap_or_else(|| default.to_string());
            (*key, value)
        })
        .collect();

    for command in commands {
        match command {
            Command::OnOff { on } => {
                values.insert("pow", if *on { "1" } else { "0" }.to_string());
            }
            Command::ThermostatTemperatureSetRange { low, high } => {
                // A single setpoint between the bounds.
                values.insert("stemp", format_setpoint((low + high) / 2.0));
            }
            Command::ThermostatTemperatureSetpoint { setpoint } => {
                values.insert("stemp", format_setpoint(*setpoint));
            }
            Command::ThermostatSetMode { mode } => match mode.as_str() {
                "off" => {
                    values.insert("pow", "0".to_string());
                }
                "on" => {
                    values.insert("pow", "1".to_string());
                }
                name => {
                    values.insert("pow", "1".to_string());
                    values.insert("mode", code_for_mode(name).to_string());
                }
            },
            Command::SetFanSpeed { fan_speed } => {
                let rate = if fan_speed == "speed_quiet" { FAN_QUIET } else { FAN_AUTO };
                values.insert("f_rate", rate.to_string());
            }
            other => {
                return Err(DeviceError::FunctionNotSupported(other.name().to_string()));
            }
        }
    }

    Ok(values)
}

/// Networked air conditioner
#[derive(Debug, Clone)]
pub struct DaikinAc {
    descriptor: DeviceDescriptor,
    hosts: AcHostTable,
    http: reqwest::Client,
}

impl DaikinAc {
    /// Create an adapter resolving its host through `hosts`
    pub fn new(descriptor: DeviceDescriptor, hosts: AcHostTable, http: reqwest::Client) -> Self {
        Self {
            descriptor,
            hosts,
            http,
        }
    }

    fn host(&self) -> Option<String> {
        self.hosts.get(&self.descriptor.mac)
    }

    async fn fetch_values(&self, host: &str, kind: &str) -> Result<HashMap<String, String>> {
        let url = format!("http://{}/aircon/get_{}_info", host, kind);
        let body = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| DeviceError::NotFound(format!("{}: {}", url, e)))?
            .text()
            .await
            .map_err(|e| DeviceError::NotFound(format!("{}: {}", url, e)))?;
        Ok(parse_values(&body))
    }
}

#[async_trait]
impl Device for DaikinAc {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    async fn state(&self) -> Result<DeviceState> {
        let host = self.host().ok_or_else(|| {
            DeviceError::NotFound(format!("no known host for AC {}", self.descriptor.mac))
        })?;

        let (sensor, control) = tokio::try_join!(
            self.fetch_values(&host, "sensor"),
            self.fetch_values(&host, "control"),
        )?;

        Ok(state_from_values(&sensor, &control))
    }

    async fn execute(&self, commands: &[Command]) -> Result<DeviceState> {
        let Some(host) = self.host() else {
            debug!("AC {} has not been discovered yet", self.descriptor.mac);
            return Ok(DeviceState::offline());
        };

        let current = self.fetch_values(&host, "control").await?;
        let values = apply_commands(&current, commands)?;

        let url = format!("http://{}/aircon/set_control_info", host);
        let body = self
            .http
            .post(&url)
            .form(&values)
            .send()
            .await
            .map_err(|e| DeviceError::Transient(format!("{}: {}", url, e)))?
            .text()
            .await
            .map_err(|e| DeviceError::Transient(format!("{}: {}", url, e)))?;

        let response = parse_values(&body);
        if response.get("ret").map(String::as_str) != Some("OK") {
            warn!(
                "AC {} rejected control values {:?}: {}",
                self.descriptor.mac,
                values,
                body.trim()
            );
            return Ok(DeviceState::failed(ErrorCode::TransientError));
        }

        self.state().await
    }
}
