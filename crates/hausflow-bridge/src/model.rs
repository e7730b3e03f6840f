/*!
 * Wire model of the assistant action protocol.
 *
 * Requests arrive as `{requestId, inputs: [{intent, payload}]}` and every
 * response is `{requestId, payload}`. Device states are embedded in the
 * per-device result objects as flattened fields.
 */
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hausflow_core::types::{DeviceState, ErrorCode, Execution};

use crate::sync::SyncDevice;

/// Prefix used by the assistant protocol for intent names
pub const INTENT_PREFIX: &str = "action.devices.";

/// An incoming action request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// Correlation id echoed in the response
    #[serde(default)]
    pub request_id: String,
    /// Request inputs; only the first one is served
    #[serde(default)]
    pub inputs: Vec<ActionInput>,
}

/// One input of an action request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionInput {
    /// Intent name, e.g. `action.devices.QUERY`
    pub intent: String,
    /// Intent-specific payload
    #[serde(default)]
    pub payload: Value,
}

/// Known request kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Enumerate devices
    Sync,
    /// Fetch device states
    Query,
    /// Apply commands
    Execute,
    /// Account unlinked
    Disconnect,
    /// Anything else
    Unknown(String),
}

impl Intent {
    /// Parse a full (`action.devices.SYNC`) or bare (`SYNC`) intent name
    pub fn parse(name: &str) -> Self {
        match name.strip_prefix(INTENT_PREFIX).unwrap_or(name) {
            "SYNC" => Intent::Sync,
            "QUERY" => Intent::Query,
            "EXECUTE" => Intent::Execute,
            "DISCONNECT" => Intent::Disconnect,
            _ => Intent::Unknown(name.to_string()),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Sync => f.write_str("SYNC"),
            Intent::Query => f.write_str("QUERY"),
            Intent::Execute => f.write_str("EXECUTE"),
            Intent::Disconnect => f.write_str("DISCONNECT"),
            Intent::Unknown(name) => f.write_str(name),
        }
    }
}

/// Reference to a device inside a request payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    /// Device id as sent by the assistant
    pub id: String,
}

/// QUERY payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryPayload {
    /// Devices to report on
    #[serde(default)]
    pub devices: Vec<DeviceRef>,
}

/// EXECUTE payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutePayload {
    /// Command groups in arrival order
    #[serde(default)]
    pub commands: Vec<CommandGroup>,
}

/// A set of executions applied to a set of devices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandGroup {
    /// Target devices
    #[serde(default)]
    pub devices: Vec<DeviceRef>,
    /// Executions in order
    #[serde(default)]
    pub execution: Vec<Execution>,
}

/// A response to an action request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    /// Correlation id copied from the request
    pub request_id: String,
    /// Intent-specific payload
    pub payload: ResponsePayload,
}

/// Intent-specific response payload
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// SYNC result
    Sync(SyncResponse),
    /// QUERY result
    Query(QueryResponse),
    /// EXECUTE result
    Execute(ExecuteResponse),
    /// Request-level failure
    Error(ErrorPayload),
    /// `{}`
    Empty(EmptyPayload),
}

/// SYNC result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Account the devices belong to
    pub agent_user_id: String,
    /// Every configured device
    pub devices: Vec<SyncDevice>,
}

/// QUERY result, keyed by device id
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResponse {
    /// Per-device results
    pub devices: BTreeMap<String, DeviceResult>,
}

/// EXECUTE result
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecuteResponse {
    /// One entry per targeted device
    pub commands: Vec<ExecuteResult>,
}

/// Request-level error payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Failure reason
    pub error_code: ErrorCode,
}

/// Empty payload, serialized as `{}`
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmptyPayload {}

/// Outcome of a per-device operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    /// The device answered normally
    Success,
    /// The device is unreachable
    Offline,
    /// The operation failed
    Error,
}

/// Per-device result of a QUERY
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResult {
    /// Outcome
    pub status: CommandStatus,
    /// Failure reason when no state could be produced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Device state fields
    #[serde(flatten)]
    pub state: Option<DeviceState>,
}

impl DeviceResult {
    /// Build a result from an adapter outcome
    pub fn from_outcome(outcome: std::result::Result<DeviceState, ErrorCode>) -> Self {
        match outcome {
            Ok(state) => Self {
                status: status_of(&state),
                error_code: None,
                state: Some(state),
            },
            Err(code) => Self::failed(code),
        }
    }

    /// A result carrying only an error code
    pub fn failed(code: ErrorCode) -> Self {
        Self {
            status: CommandStatus::Error,
            error_code: Some(code),
            state: None,
        }
    }
}

/// Per-device result of an EXECUTE
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteResult {
    /// Device the result is for
    pub ids: Vec<String>,
    /// Outcome and state
    #[serde(flatten)]
    pub result: DeviceResult,
}

impl ExecuteResult {
    /// Result for a single device id
    pub fn new(id: impl Into<String>, result: DeviceResult) -> Self {
        Self {
            ids: vec![id.into()],
            result,
        }
    }
}

/// Status for a state returned by an adapter. An embedded error code wins
/// over the online flag.
fn status_of(state: &DeviceState) -> CommandStatus {
    if state.error_code.is_some() {
        CommandStatus::Error
    } else if !state.online {
        CommandStatus::Offline
    } else {
        CommandStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_parse() {
        assert_eq!(Intent::parse("action.devices.SYNC"), Intent::Sync);
        assert_eq!(Intent::parse("QUERY"), Intent::Query);
        assert_eq!(Intent::parse("action.devices.EXECUTE"), Intent::Execute);
        assert_eq!(Intent::parse("action.devices.DISCONNECT"), Intent::Disconnect);
        assert_eq!(
            Intent::parse("action.devices.REBOOT"),
            Intent::Unknown("action.devices.REBOOT".into())
        );
    }

    #[test]
    fn test_request_parsing() {
        let raw = json!({
            "requestId": "r1",
            "inputs": [{
                "intent": "action.devices.EXECUTE",
                "payload": {"commands": [{
                    "devices": [{"id": "00:0d:6f:c6:aa:f5"}],
                    "execution": [{"command": "action.devices.commands.OnOff", "params": {"on": true}}],
                }]},
            }],
        });
        let request: ActionRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.request_id, "r1");

        let payload: ExecutePayload =
            serde_json::from_value(request.inputs[0].payload.clone()).unwrap();
        assert_eq!(payload.commands[0].devices[0].id, "00:0d:6f:c6:aa:f5");
        assert_eq!(payload.commands[0].execution[0].params["on"], json!(true));
    }

    #[test]
    fn test_device_result_flattens_state() {
        let state = DeviceState {
            on: Some(true),
            brightness: Some(200),
            ..DeviceState::online()
        };
        let result = ExecuteResult::new("a", DeviceResult::from_outcome(Ok(state)));
        assert_eq!(
            serde_json::to_value(result).unwrap(),
            json!({"ids": ["a"], "status": "SUCCESS", "online": true, "on": true, "brightness": 200})
        );

        let result = DeviceResult::failed(ErrorCode::UnableToLocateDevice);
        assert_eq!(
            serde_json::to_value(result).unwrap(),
            json!({"status": "ERROR", "errorCode": "unableToLocateDevice"})
        );
    }

    #[test]
    fn test_status_rules() {
        let offline = DeviceResult::from_outcome(Ok(DeviceState::offline()));
        assert_eq!(offline.status, CommandStatus::Offline);

        let refused = DeviceResult::from_outcome(Ok(DeviceState::failed(ErrorCode::TransientError)));
        assert_eq!(refused.status, CommandStatus::Error);
        assert_eq!(
            serde_json::to_value(refused).unwrap(),
            json!({"status": "ERROR", "online": true, "errorCode": "transientError"})
        );
    }

    #[test]
    fn test_empty_and_error_payloads() {
        let response = ActionResponse {
            request_id: "r2".into(),
            payload: ResponsePayload::Empty(EmptyPayload::default()),
        };
        assert_eq!(serde_json::to_value(response).unwrap(), json!({"requestId": "r2", "payload": {}}));

        let response = ActionResponse {
            request_id: "r3".into(),
            payload: ResponsePayload::Error(ErrorPayload {
                error_code: ErrorCode::NotSupported,
            }),
        };
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({"requestId": "r3", "payload": {"errorCode": "notSupported"}})
        );
    }
}
