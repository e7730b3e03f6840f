/*!
 * WebSocket push channel.
 *
 * Each connected client receives every registry event that changed a device
 * as a `{id, state}` text message; repeated identical updates are skipped. Delivery is best effort: nothing is buffered
 * for clients that are not connected, so clients still poll with QUERY.
 */
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hausflow_core::types::{ChangeEvent, DeviceState, MacAddress};
use hausflow_devices::DeviceRegistry;

/// One message on the push channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    /// Device address
    pub id: MacAddress,
    /// State after the change
    pub state: DeviceState,
}

impl From<ChangeEvent> for PushMessage {
    fn from(event: ChangeEvent) -> Self {
        Self {
            id: event.id,
            state: event.state,
        }
    }
}

/// Router upgrading `GET /` to a push connection
pub fn push_router(registry: Arc<DeviceRegistry>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(registry)
}

/// Serve the push channel on `listener` until the task is dropped
pub async fn serve_push(listener: TcpListener, registry: Arc<DeviceRegistry>) -> std::io::Result<()> {
    info!("Push channel listening on {}", listener.local_addr()?);
    axum::serve(listener, push_router(registry)).await
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(registry): State<Arc<DeviceRegistry>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| forward_changes(socket, registry))
}

async fn forward_changes(socket: WebSocket, registry: Arc<DeviceRegistry>) {
    let client_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut changes = registry.subscribe();

    info!("Push client {} connected", client_id);

    loop {
        tokio::select! {
            change = changes.recv() => {
                let Some(change) = change else {
                    break;
                };
                if !change.is_change {
                    continue;
                }
                let text = match serde_json::to_string(&PushMessage::from(change)) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize change: {}", e);
                        continue;
                    }
                };
                if sender.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!("Push client {} error: {}", client_id, e);
                    break;
                }
                // Server to client only
                Some(Ok(_)) => debug!("Ignoring message from push client {}", client_id),
            }
        }
    }

    info!("Push client {} disconnected", client_id);
}
