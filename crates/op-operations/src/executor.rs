//! Runs closures as operations in the operation tree

use std::sync::Arc;
use tracing::{debug, warn};

use crate::current::{CurrentOperationRef, OperationRef};
use crate::listener::OperationListenerManager;
use crate::types::{
    OperationDescriptor, OperationDetails, OperationFinishEvent, OperationIdFactory,
    OperationProgressEvent, OperationStartEvent,
};

/// Executes work as child operations of the calling thread's current
/// operation and announces each one to the listener manager.
pub struct OperationExecutor {
    ids: OperationIdFactory,
    listeners: Arc<OperationListenerManager>,
}

impl OperationExecutor {
    pub fn new(listeners: Arc<OperationListenerManager>) -> Self {
        Self {
            ids: OperationIdFactory::new(),
            listeners,
        }
    }

    pub fn listeners(&self) -> &Arc<OperationListenerManager> {
        &self.listeners
    }

    /// Run `f` as a new operation named `name`.
    ///
    /// The operation is the current operation while `f` runs. `finished` is
    /// delivered even if `f` panics.
    pub fn run<T>(
        &self,
        name: &str,
        details: OperationDetails,
        f: impl FnOnce(OperationRef) -> T,
    ) -> T {
        let id = self.ids.next_id();
        let parent_id = CurrentOperationRef::id();
        let descriptor = OperationDescriptor::new(id, parent_id, name, details);
        self.run_descriptor(OperationRef::new(id, parent_id), descriptor, f)
    }

    /// Run `f` as the action of the task at `task_path`
    pub fn run_task<T>(&self, task_path: &str, f: impl FnOnce(OperationRef) -> T) -> T {
        let id = self.ids.next_id();
        let parent_id = CurrentOperationRef::id();
        let descriptor = OperationDescriptor::task(id, parent_id, task_path);
        self.run_descriptor(OperationRef::new(id, parent_id), descriptor, f)
    }

    pub fn progress(&self, details: serde_json::Value) {
        if let Some(id) = CurrentOperationRef::id() {
            self.listeners.progress(id, &OperationProgressEvent::now(details));
        }
    }

    fn run_descriptor<T>(
        &self,
        operation: OperationRef,
        descriptor: OperationDescriptor,
        f: impl FnOnce(OperationRef) -> T,
    ) -> T {
        let start = OperationStartEvent::now();
        let failures = self.listeners.started(&descriptor, &start);
        if !failures.is_empty() {
            warn!(operation = %descriptor, failures = failures.len(), "Operation start reported listener failures");
        }

        let _finish = FinishGuard {
            listeners: &self.listeners,
            descriptor: &descriptor,
            start,
        };
        debug!(operation = %descriptor, parent_id = ?descriptor.parent_id, "Running operation");
        CurrentOperationRef::with(Some(operation), || f(operation))
    }
}

/// Delivers `finished` on drop, so unwinding operations are closed too
struct FinishGuard<'a> {
    listeners: &'a OperationListenerManager,
    descriptor: &'a OperationDescriptor,
    start: OperationStartEvent,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        let finish = if std::thread::panicking() {
            OperationFinishEvent::failed(self.start.start_time, "operation panicked")
        } else {
            OperationFinishEvent::succeeded(self.start.start_time)
        };
        let failures = self.listeners.finished(self.descriptor, &finish);
        if !failures.is_empty() {
            warn!(operation = %self.descriptor, failures = failures.len(), "Operation finish reported listener failures");
        }
    }
}
