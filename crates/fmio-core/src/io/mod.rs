//! Copy, move and remove jobs executed in the background.
//!
//! [`IoJobManager`] owns the queue and the worker thread; [`JobDescriptor`]
//! describes one request; progress and prompts travel as
//! [`crate::event::JobEvent`]s.

pub mod control;
pub mod job;
pub mod manager;
pub mod progress;
mod runner;

pub use control::JobControl;
pub use job::{ConflictResolution, JobDescriptor, JobOutcome, JobState, JobStats, TaskKind};
pub use manager::IoJobManager;
pub use progress::{format_rate, format_size, ProgressClock};
pub use runner::BLOCK_SIZE;
