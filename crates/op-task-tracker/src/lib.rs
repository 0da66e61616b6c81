//! OP Task Tracker - Task Execution Context Queries
//!
//! Answers whether the calling thread currently runs inside a task's
//! action, directly or several operations below it:
//! - Registry of running task execution operations fed by operation listeners
//! - Ancestry walk from the thread's current operation
//! - Configuration, prometheus metrics and structured logging

pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod telemetry;
pub mod tracker;

pub use config::{DisposedQueryPolicy, TrackerConfig};
pub use error::{Result, TrackerError};
pub use metrics::TrackerMetrics;
pub use registry::RunningTaskRegistry;
pub use telemetry::TrackerTelemetry;
pub use tracker::{DefaultTaskExecutionTracker, TaskExecutionTracker};
