//! Registry of running task execution operations
//!
//! Fed by operation notifications from any thread. Membership reads take a
//! short shared lock on the set and never wait on an ancestry walk.

use op_operations::{
    OperationDescriptor, OperationFinishEvent, OperationId, OperationListener, OperationStartEvent,
};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{trace, warn};

use crate::error::{Result, TrackerError};
use crate::metrics::TrackerMetrics;
use crate::telemetry::TrackerTelemetry;

/// Set of task execution operations that have started but not finished
pub struct RunningTaskRegistry {
    running: RwLock<HashSet<OperationId>>,

    /// Set under the write lock; once set no id is ever added again
    closed: AtomicBool,

    /// The running gauge is only written while `running` is write locked
    metrics: Option<TrackerMetrics>,
    telemetry: TrackerTelemetry,
}

impl RunningTaskRegistry {
    pub fn new(telemetry: TrackerTelemetry, metrics: Option<TrackerMetrics>) -> Self {
        Self {
            running: RwLock::new(HashSet::new()),
            closed: AtomicBool::new(false),
            metrics,
            telemetry,
        }
    }

    /// Record a started operation.
    ///
    /// Returns whether the id was added. Non-task operations and events
    /// arriving after [`close`](Self::close) are ignored. A task operation
    /// without an id is an error.
    pub fn on_started(&self, descriptor: &OperationDescriptor) -> Result<bool> {
        if !descriptor.is_task_execution() {
            return Ok(false);
        }
        let id = descriptor.id.ok_or_else(|| TrackerError::missing_id(descriptor))?;

        let mut running = self.running.write();
        if self.closed.load(Ordering::Acquire) {
            trace!(operation_id = %id, "Ignoring task start on closed registry");
            return Ok(false);
        }
        if !running.insert(id) {
            warn!(operation_id = %id, "Task operation started twice without finishing");
            return Ok(false);
        }
        let count = running.len();
        if let Some(metrics) = &self.metrics {
            metrics.task_started(count);
        }
        drop(running);

        self.telemetry.task_started(descriptor, count);
        Ok(true)
    }

    /// Record a finished operation.
    ///
    /// Returns whether the id was present. Removing an id that is not
    /// running is a no-op.
    pub fn on_finished(
        &self,
        descriptor: &OperationDescriptor,
        event: &OperationFinishEvent,
    ) -> Result<bool> {
        if !descriptor.is_task_execution() {
            return Ok(false);
        }
        let id = descriptor.id.ok_or_else(|| TrackerError::missing_id(descriptor))?;

        let mut running = self.running.write();
        let removed = running.remove(&id);
        if let Some(metrics) = &self.metrics {
            metrics.task_finished(running.len());
        }
        drop(running);

        self.telemetry.task_finished(descriptor, event, removed);
        Ok(removed)
    }

    pub fn contains(&self, id: OperationId) -> bool {
        self.running.read().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.running.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids running at the time of the call, in ascending order
    pub fn snapshot(&self) -> Vec<OperationId> {
        let mut ids: Vec<_> = self.running.read().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn metrics(&self) -> Option<&TrackerMetrics> {
        self.metrics.as_ref()
    }

    pub fn telemetry(&self) -> &TrackerTelemetry {
        &self.telemetry
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting ids and drop every running entry.
    ///
    /// Returns the number of discarded entries.
    pub fn close(&self) -> usize {
        let mut running = self.running.write();
        self.closed.store(true, Ordering::Release);
        let discarded = running.len();
        running.clear();
        if let Some(metrics) = &self.metrics {
            metrics.set_running(0);
        }
        drop(running);

        discarded
    }
}

impl OperationListener for RunningTaskRegistry {
    fn name(&self) -> &str {
        "task-execution-tracker"
    }

    fn started(
        &self,
        descriptor: &OperationDescriptor,
        _event: &OperationStartEvent,
    ) -> op_operations::Result<()> {
        self.on_started(descriptor)?;
        Ok(())
    }

    fn finished(
        &self,
        descriptor: &OperationDescriptor,
        event: &OperationFinishEvent,
    ) -> op_operations::Result<()> {
        self.on_finished(descriptor, event)?;
        Ok(())
    }
}
