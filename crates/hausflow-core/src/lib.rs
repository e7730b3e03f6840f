/*!
 * Hausflow Core
 *
 * This crate provides the shared foundation of the Hausflow gateway: the
 * device data model, configuration, logging, the event bus, the coalescing
 * queue and supervision of long-lived tasks.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod prelude;
pub mod queue;
pub mod task;
pub mod types;
pub mod utils;

/// Hausflow core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
