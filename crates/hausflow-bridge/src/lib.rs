/*!
 * Hausflow Bridge
 *
 * This crate exposes the device registry to a smart-home assistant: the
 * SYNC/QUERY/EXECUTE/DISCONNECT action endpoint, the WebSocket push channel
 * and the debounced state reporting pipeline. [`Gateway`] wires them together
 * with the beacon transport from configuration.
 */

#![warn(missing_docs)]

// Re-export core types
pub use hausflow_core::prelude;

pub mod error;
pub mod gateway;
pub mod http;
pub mod model;
pub mod push;
pub mod reporting;
pub mod smarthome;
pub mod sync;

pub use error::{Error, Result};
pub use gateway::Gateway;
pub use http::{action_router, serve_actions};
pub use model::{ActionRequest, ActionResponse, CommandStatus, Intent};
pub use push::{push_router, serve_push, PushMessage};
pub use reporting::{ChangeReporter, StaticToken, TokenSource};
pub use smarthome::SmartHome;
pub use sync::{sync_device, SyncDevice};

/// Hausflow bridge crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the bridge
pub fn init() -> Result<()> {
    tracing::info!("Hausflow Bridge {} initialized", VERSION);
    Ok(())
}
