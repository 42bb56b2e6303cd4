//! Administrative service actions.
//!
//! Service actions run outside of any statement: the client attaches to the
//! service manager, starts an action and drains the action's textual output.
//!
//! - `service` - The `ServiceChannel` trait and the attach/detach session
//! - `statistics` - The database statistics action

pub mod service;
pub mod statistics;

pub use service::{ServiceAction, ServiceChannel, ServiceHandle, ServiceRequest, ServiceSession};
pub use statistics::StatisticsManager;
