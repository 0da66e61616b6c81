//! Operation identity, descriptors and lifecycle event payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier of a single operation instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(u64);

impl OperationId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OperationId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Hands out process-unique operation ids, starting at 1
#[derive(Debug)]
pub struct OperationIdFactory {
    next: AtomicU64,
}

impl OperationIdFactory {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> OperationId {
        OperationId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for OperationIdFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-specific details used to classify an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationDetails {
    /// A task's action is running
    ExecuteTask { task_path: String },

    /// Any other kind of operation
    Other {
        kind: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl OperationDetails {
    pub fn execute_task(task_path: impl Into<String>) -> Self {
        OperationDetails::ExecuteTask {
            task_path: task_path.into(),
        }
    }

    pub fn other(kind: impl Into<String>) -> Self {
        OperationDetails::Other {
            kind: kind.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn is_task_execution(&self) -> bool {
        matches!(self, OperationDetails::ExecuteTask { .. })
    }
}

/// Static facts about an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// Operation id; only absent when the emitting infrastructure is broken
    pub id: Option<OperationId>,

    /// Parent operation, absent for roots
    pub parent_id: Option<OperationId>,

    /// Short machine name
    pub name: String,

    /// Human readable name
    pub display_name: String,

    pub details: OperationDetails,
}

impl OperationDescriptor {
    /// Create a descriptor whose display name equals its name
    pub fn new(
        id: OperationId,
        parent_id: Option<OperationId>,
        name: &str,
        details: OperationDetails,
    ) -> Self {
        Self {
            id: Some(id),
            parent_id,
            name: name.to_string(),
            display_name: name.to_string(),
            details,
        }
    }

    /// Descriptor for a task action; named after the task path
    pub fn task(id: OperationId, parent_id: Option<OperationId>, task_path: &str) -> Self {
        let mut descriptor = Self::new(
            id,
            parent_id,
            "execute-task",
            OperationDetails::execute_task(task_path),
        );
        descriptor.display_name = format!("Task {}", task_path);
        descriptor
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn is_task_execution(&self) -> bool {
        self.details.is_task_execution()
    }
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} (id {})", self.display_name, id),
            None => write!(f, "{} (no id)", self.display_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationStartEvent {
    pub start_time: DateTime<Utc>,
}

impl OperationStartEvent {
    pub fn now() -> Self {
        Self {
            start_time: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationProgressEvent {
    pub time: DateTime<Utc>,
    pub details: serde_json::Value,
}

impl OperationProgressEvent {
    pub fn now(details: serde_json::Value) -> Self {
        Self {
            time: Utc::now(),
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationFinishEvent {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    /// Failure message if the operation failed
    pub failure: Option<String>,

    /// Operation specific result
    pub result: Option<serde_json::Value>,
}

impl OperationFinishEvent {
    /// Successful completion of an operation started at `start_time`
    pub fn succeeded(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: Utc::now(),
            failure: None,
            result: None,
        }
    }

    pub fn failed(start_time: DateTime<Utc>, failure: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time: Utc::now(),
            failure: Some(failure.into()),
            result: None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        (self.end_time - self.start_time).num_milliseconds().max(0) as u64
    }
}
