/*!
 * Assistant action handling over the device registry.
 *
 * Per-device failures never fail a whole QUERY or EXECUTE batch; they fill
 * that device's slot with an error result while the rest proceed.
 */
use std::sync::Arc;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use hausflow_core::types::{Command, ErrorCode, Execution, MacAddress};
use hausflow_devices::DeviceRegistry;

use crate::model::{
    ActionRequest, ActionResponse, CommandGroup, DeviceResult, EmptyPayload, ErrorPayload,
    ExecutePayload, ExecuteResponse, ExecuteResult, Intent, QueryPayload, QueryResponse,
    ResponsePayload, SyncResponse,
};
use crate::sync::sync_device;

/// Stateless action handler
#[derive(Debug, Clone)]
pub struct SmartHome {
    registry: Arc<DeviceRegistry>,
    agent_user_id: String,
}

impl SmartHome {
    /// Create a handler serving `registry`
    pub fn new(registry: Arc<DeviceRegistry>, agent_user_id: impl Into<String>) -> Self {
        Self {
            registry,
            agent_user_id: agent_user_id.into(),
        }
    }

    /// The registry behind this handler
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Serve one request. Only the first input is considered.
    pub async fn handle(&self, request: ActionRequest) -> ActionResponse {
        let request_id = request.request_id;
        let Some(input) = request.inputs.into_iter().next() else {
            warn!("Action request {} has no inputs", request_id);
            return ActionResponse {
                request_id,
                payload: not_supported(),
            };
        };

        let intent = Intent::parse(&input.intent);
        debug!("Serving {} for request {}", intent, request_id);

        let payload = match intent {
            Intent::Sync => ResponsePayload::Sync(self.sync()),
            Intent::Query => {
                ResponsePayload::Query(self.query(decode_payload(&intent, input.payload)).await)
            }
            Intent::Execute => {
                ResponsePayload::Execute(self.execute(decode_payload(&intent, input.payload)).await)
            }
            Intent::Disconnect => ResponsePayload::Empty(EmptyPayload::default()),
            Intent::Unknown(name) => {
                warn!("Unsupported intent {:?}", name);
                not_supported()
            }
        };

        ActionResponse {
            request_id,
            payload,
        }
    }

    /// Enumerate every configured device
    pub fn sync(&self) -> SyncResponse {
        SyncResponse {
            agent_user_id: self.agent_user_id.clone(),
            devices: self.registry.descriptors().iter().map(sync_device).collect(),
        }
    }

    /// Fetch the state of each requested device concurrently
    pub async fn query(&self, payload: QueryPayload) -> QueryResponse {
        let lookups = payload.devices.into_iter().map(|device| async move {
            let outcome = match self.locate(&device.id) {
                Some(mac) => self.registry.get_state(&mac).await.map_err(|e| {
                    warn!("Query of {} failed: {}", mac, e);
                    e.code()
                }),
                None => Err(ErrorCode::UnableToLocateDevice),
            };
            (device.id, DeviceResult::from_outcome(outcome))
        });

        QueryResponse {
            devices: join_all(lookups).await.into_iter().collect(),
        }
    }

    /// Apply the requested commands, one concurrent call per device
    pub async fn execute(&self, payload: ExecutePayload) -> ExecuteResponse {
        let calls = group_commands(payload.commands)
            .into_iter()
            .map(|(id, executions)| async move {
                let commands: Vec<Command> = executions.iter().map(Command::from).collect();
                let outcome = match self.locate(&id) {
                    Some(mac) => self.registry.execute(&mac, &commands).await.map_err(|e| {
                        warn!("Execute on {} failed: {}", mac, e);
                        e.code()
                    }),
                    None => Err(ErrorCode::UnableToLocateDevice),
                };
                ExecuteResult::new(id, DeviceResult::from_outcome(outcome))
            });

        ExecuteResponse {
            commands: join_all(calls).await,
        }
    }

    fn locate(&self, id: &str) -> Option<MacAddress> {
        let mac = id.parse::<MacAddress>().ok()?;
        self.registry.contains(&mac).then_some(mac)
    }
}

/// Flatten command groups into one execution list per device id, keeping
/// both the first-seen device order and the arrival order of executions.
pub fn group_commands(groups: Vec<CommandGroup>) -> Vec<(String, Vec<Execution>)> {
    let mut grouped: Vec<(String, Vec<Execution>)> = Vec::new();

    for group in groups {
        for device in group.devices {
            match grouped.iter_mut().find(|(id, _)| *id == device.id) {
                Some((_, executions)) => executions.extend(group.execution.iter().cloned()),
                None => grouped.push((device.id, group.execution.clone())),
            }
        }
    }

    grouped
}

fn decode_payload<T: DeserializeOwned + Default>(intent: &Intent, payload: Value) -> T {
    if payload.is_null() {
        return T::default();
    }
    serde_json::from_value(payload).unwrap_or_else(|e| {
        warn!("Malformed {} payload: {}", intent, e);
        T::default()
    })
}

fn not_supported() -> ResponsePayload {
    ResponsePayload::Error(ErrorPayload {
        error_code: ErrorCode::NotSupported,
    })
}
