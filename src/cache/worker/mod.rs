//! Background workers
//!
//! A bounded pool records accesses off the caller's thread and falls back to
//! running on the caller when saturated. Scheduled loops drive promotion,
//! refresh and monitoring.

pub mod access_pool;
pub mod coordinator;
pub mod scheduled_task;
pub mod types;

pub use access_pool::{AccessPoolSnapshot, AccessWorkerPool};
pub use coordinator::{MonitorFn, TaskCoordinator};
pub use scheduled_task::ScheduledTask;
pub use types::{CoordinatorState, TickReport};
