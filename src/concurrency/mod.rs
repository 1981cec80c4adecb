//! Admission-controlled threads and batch workers.
//!
//! Every independent kind of parallel work (tree growth, subtree growth, candidate search,
//! classification) gets its own [`scheduler::ThreadScheduler`] with a hard cap, so unrelated
//! work never competes for the same slots.

/// Thread scheduler with a hard cap on concurrently running tasks
pub mod scheduler;
/// Workers bound to index ranges and the groups that run them
pub mod worker;

pub use scheduler::{ScopedTaskHandle, TaskHandle, ThreadScheduler};
pub use worker::{Progress, Worker, WorkerGroup};
