use op_operations::{OperationDescriptor, OperationFinishEvent, OperationId};
use tracing::{debug, info, instrument};

/// Structured logging for task execution tracking
pub struct TrackerTelemetry {
    /// Service name for tracing
    service_name: String,
}

impl TrackerTelemetry {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[instrument(skip(self, descriptor), fields(
        operation_id = ?descriptor.id,
        parent_id = ?descriptor.parent_id,
        service = %self.service_name
    ))]
    pub fn task_started(&self, descriptor: &OperationDescriptor, running: usize) {
        debug!(
            operation = %descriptor.display_name,
            running,
            "Task execution started"
        );
    }

    #[instrument(skip(self, descriptor, event), fields(
        operation_id = ?descriptor.id,
        duration_ms = event.duration_ms(),
        service = %self.service_name
    ))]
    pub fn task_finished(
        &self,
        descriptor: &OperationDescriptor,
        event: &OperationFinishEvent,
        was_running: bool,
    ) {
        match (&event.failure, was_running) {
            (_, false) => debug!(
                operation = %descriptor.display_name,
                "Finish for task execution that was not running"
            ),
            (None, true) => debug!(operation = %descriptor.display_name, "Task execution finished"),
            (Some(failure), true) => debug!(
                operation = %descriptor.display_name,
                failure = %failure,
                "Task execution failed"
            ),
        }
    }

    pub fn query_answered(&self, current: Option<OperationId>, task: Option<OperationId>) {
        debug!(
            service = %self.service_name,
            current_operation = ?current,
            task_operation = ?task,
            "Answered task execution query"
        );
    }

    pub fn tracker_closed(&self, discarded: usize) {
        info!(
            service = %self.service_name,
            discarded,
            "Task execution tracker closed"
        );
    }
}
