/*!
 * Prelude module for Hausflow Core.
 *
 * This module re-exports commonly used types and functions from the Hausflow Core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{
    ChangeEvent, Command, DeviceDescriptor, DeviceKind, DeviceState, ErrorCode, Execution,
    MacAddress, ThermostatMode,
};

// Re-export event types
pub use crate::event::{EventBus, Subscription};

// Re-export supervision types
pub use crate::queue::CoalescingQueue;
pub use crate::task::{run_forever, spawn_supervised, BackoffPolicy, Progress};

// Re-export config types
pub use crate::config::{Config, ConfigBuilder};

// Re-export utility functions
pub use crate::utils::{random_duration, random_hex, spawn_and_log};

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};
