pub mod coordinator;
pub mod scheduler;

pub use coordinator::{BatchOutcome, RefreshCoordinator, RefreshOutcome, RefreshSettings};
pub use scheduler::{RefreshScheduler, SchedulerSettings, SchedulerStats, SchedulerStatus};
