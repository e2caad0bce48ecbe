//! Background jobs.

mod scheduler;

pub use scheduler::{Scheduler, SchedulerConfig, register_cleanup_jobs};
