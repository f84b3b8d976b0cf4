//! Task graph interpretation and task group scheduling.
//!
//! Graphs come in two versions. Version 0 graphs are mustache templates that
//! render to an explicit task list. Version 1 graphs are expression documents
//! (see [`expr`]) evaluated against the push. Either way the tasks are
//! normalised, given a task group and scheduler id, and submitted to the
//! queue. A graph that fails to render or interpret is replaced by a single
//! error task.

pub mod config;
pub mod error_task;
pub mod expr;
pub mod job;
pub mod queue;
pub mod scheduler;

pub use config::{ProjectConfig, TryConfig};
pub use job::{PreparedPush, PushJob};
pub use queue::{CreatedTask, MemoryQueue};
pub use scheduler::{
    SchedulerOptions, SubmissionOutcome, TaskGroup, TaskGroupReport, TaskGroupScheduler,
    schedule_task_group,
};
