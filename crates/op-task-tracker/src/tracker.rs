//! Execution context query
//!
//! Combines the calling thread's current operation, the ancestry tracker and
//! the running task registry to tell whether a task's action encloses the
//! caller.

use op_operations::{
    AncestryTracker, CurrentOperationRef, CurrentOperationSource, OperationId,
    OperationListenerManager,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::config::{DisposedQueryPolicy, TrackerConfig};
use crate::error::{Result, TrackerError};
use crate::metrics::TrackerMetrics;
use crate::registry::RunningTaskRegistry;
use crate::telemetry::TrackerTelemetry;

/// Tracks task execution so callers can forbid actions while a task runs,
/// including from work forked onto other threads by the task.
pub trait TaskExecutionTracker: Send + Sync {
    /// Whether the calling thread runs nested inside a task execution
    /// operation, the current operation itself included
    fn is_currently_inside_task_execution(&self) -> bool;
}

/// Task execution tracker fed by a process wide operation listener.
///
/// The registry is subscribed on construction and unsubscribed by
/// [`close`](Self::close) or on drop.
pub struct DefaultTaskExecutionTracker {
    registry: Arc<RunningTaskRegistry>,
    ancestry: Arc<dyn AncestryTracker>,
    current: Arc<dyn CurrentOperationSource>,
    listeners: Arc<OperationListenerManager>,
    config: TrackerConfig,
    subscribed: AtomicBool,
}

impl DefaultTaskExecutionTracker {
    /// Create a tracker reading the thread-ambient current operation
    pub fn new(
        ancestry: Arc<dyn AncestryTracker>,
        listeners: Arc<OperationListenerManager>,
        config: TrackerConfig,
    ) -> Result<Self> {
        Self::with_operation_source(ancestry, listeners, Arc::new(CurrentOperationRef), config)
    }

    /// Create a tracker reading the current operation from `current`
    #[instrument(skip_all, fields(service = %config.service_name))]
    pub fn with_operation_source(
        ancestry: Arc<dyn AncestryTracker>,
        listeners: Arc<OperationListenerManager>,
        current: Arc<dyn CurrentOperationSource>,
        config: TrackerConfig,
    ) -> Result<Self> {
        let metrics = if config.metrics_enabled {
            Some(TrackerMetrics::new()?)
        } else {
            None
        };
        let registry = Arc::new(RunningTaskRegistry::new(
            TrackerTelemetry::new(&config.service_name),
            metrics,
        ));

        listeners.add_listener(registry.clone());
        debug!(disposed_query = %config.disposed_query, "Task execution tracker subscribed");

        Ok(Self {
            registry,
            ancestry,
            current,
            listeners,
            config,
            subscribed: AtomicBool::new(true),
        })
    }

    pub fn registry(&self) -> &Arc<RunningTaskRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> Option<&TrackerMetrics> {
        self.registry.metrics()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The closest enclosing task execution operation of the calling thread
    pub fn enclosing_task_operation(&self) -> Result<Option<OperationId>> {
        if self.registry.is_closed() {
            return match self.config.disposed_query {
                DisposedQueryPolicy::NotInside => {
                    debug!("Task execution query on closed tracker");
                    Ok(None)
                }
                DisposedQueryPolicy::Fail => Err(TrackerError::Disposed),
            };
        }

        let current = self.current.current_operation_id();
        let task = match current {
            Some(_) => self
                .ancestry
                .find_closest_matching_ancestor(current, &|id: OperationId| self.registry.contains(id)),
            None => None,
        };

        if let Some(metrics) = self.registry.metrics() {
            metrics.query_answered(task.is_some());
        }
        self.registry.telemetry().query_answered(current, task);
        Ok(task)
    }

    pub fn try_is_currently_inside_task_execution(&self) -> Result<bool> {
        Ok(self.enclosing_task_operation()?.is_some())
    }

    pub fn is_closed(&self) -> bool {
        !self.subscribed.load(Ordering::Acquire)
    }

    /// Unsubscribe from operation notifications and discard running entries.
    ///
    /// Once this returns no further notification reaches the registry.
    /// Calling it again does nothing.
    pub fn close(&self) {
        if !self.subscribed.swap(false, Ordering::AcqRel) {
            return;
        }
        self.listeners.remove_listener(&self.registry);
        let discarded = self.registry.close();
        self.registry.telemetry().tracker_closed(discarded);
    }
}

impl TaskExecutionTracker for DefaultTaskExecutionTracker {
    fn is_currently_inside_task_execution(&self) -> bool {
        match self.try_is_currently_inside_task_execution() {
            Ok(inside) => inside,
            Err(e) => {
                error!(error = %e, "Task execution query failed");
                false
            }
        }
    }
}

impl Drop for DefaultTaskExecutionTracker {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use op_operations::{
        OperationDescriptor, OperationFinishEvent, OperationRef, OperationStartEvent,
        ParentMapAncestryTracker,
    };
    use parking_lot::Mutex;

    /// Current operation fixed by the test instead of read from the thread
    #[derive(Default)]
    struct FixedOperationSource(Mutex<Option<OperationRef>>);

    impl FixedOperationSource {
        fn set(&self, id: Option<u64>) {
            *self.0.lock() = id.map(|raw| OperationRef::new(OperationId::new(raw), None));
        }
    }

    impl CurrentOperationSource for FixedOperationSource {
        fn current_operation(&self) -> Option<OperationRef> {
            *self.0.lock()
        }
    }

    struct Fixture {
        listeners: Arc<OperationListenerManager>,
        ancestry: Arc<ParentMapAncestryTracker>,
        current: Arc<FixedOperationSource>,
    }

    impl Fixture {
        fn new() -> Self {
            let listeners = Arc::new(OperationListenerManager::new());
            let ancestry = Arc::new(ParentMapAncestryTracker::new());
            listeners.add_listener(ancestry.clone());
            Self {
                listeners,
                ancestry,
                current: Arc::new(FixedOperationSource::default()),
            }
        }

        fn tracker(&self, config: TrackerConfig) -> DefaultTaskExecutionTracker {
            DefaultTaskExecutionTracker::with_operation_source(
                self.ancestry.clone(),
                self.listeners.clone(),
                self.current.clone(),
                config,
            )
            .unwrap()
        }

        fn start(&self, descriptor: &OperationDescriptor) {
            assert!(self.listeners.started(descriptor, &OperationStartEvent::now()).is_empty());
        }

        fn finish(&self, descriptor: &OperationDescriptor) {
            let event = OperationFinishEvent::succeeded(OperationStartEvent::now().start_time);
            assert!(self.listeners.finished(descriptor, &event).is_empty());
        }
    }

    fn id(raw: u64) -> OperationId {
        OperationId::new(raw)
    }

    #[test]
    fn test_current_operation_is_the_task() {
        let fixture = Fixture::new();
        let tracker = fixture.tracker(TrackerConfig::default());
        fixture.start(&OperationDescriptor::task(id(1), None, ":compile"));

        fixture.current.set(Some(1));
        assert!(tracker.is_currently_inside_task_execution());
        assert_eq!(tracker.enclosing_task_operation().unwrap(), Some(id(1)));
    }

    #[test]
    fn test_no_current_operation() {
        let fixture = Fixture::new();
        let tracker = fixture.tracker(TrackerConfig::default());
        fixture.start(&OperationDescriptor::task(id(1), None, ":compile"));

        fixture.current.set(None);
        assert!(!tracker.is_currently_inside_task_execution());
    }

    #[test]
    fn test_query_metrics_recorded() {
        let fixture = Fixture::new();
        let tracker = fixture.tracker(TrackerConfig::default());
        fixture.start(&OperationDescriptor::task(id(1), None, ":compile"));
        fixture.current.set(Some(1));
        tracker.is_currently_inside_task_execution();
        fixture.current.set(Some(2));
        tracker.is_currently_inside_task_execution();

        let json = tracker.metrics().unwrap().gather_json();
        let hits = json["metrics"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["name"] == "task_execution_query_hits_total")
            .unwrap()["value"]
            .as_f64();
        assert_eq!(hits, Some(1.0));
    }

    #[test]
    fn test_metrics_disabled() {
        let fixture = Fixture::new();
        let tracker = fixture.tracker(TrackerConfig::default().with_metrics(false));
        assert!(tracker.metrics().is_none());
    }

    #[test]
    fn test_close_unsubscribes_once() {
        let fixture = Fixture::new();
        let tracker = fixture.tracker(TrackerConfig::default());
        assert_eq!(fixture.listeners.listener_count(), 2);

        tracker.close();
        tracker.close();
        assert!(tracker.is_closed());
        assert_eq!(fixture.listeners.listener_count(), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let fixture = Fixture::new();
        drop(fixture.tracker(TrackerConfig::default()));
        assert_eq!(fixture.listeners.listener_count(), 1);
    }

    #[test]
    fn test_disposed_query_policies() {
        let fixture = Fixture::new();
        let lenient = fixture.tracker(TrackerConfig::default());
        fixture.start(&OperationDescriptor::task(id(2), None, ":test"));
        fixture.current.set(Some(2));
        assert!(lenient.is_currently_inside_task_execution());
        lenient.close();
        assert!(!lenient.is_currently_inside_task_execution());
        assert_eq!(lenient.enclosing_task_operation().unwrap(), None);

        let strict =
            fixture.tracker(TrackerConfig::default().with_disposed_query(DisposedQueryPolicy::Fail));
        strict.close();
        assert!(matches!(
            strict.try_is_currently_inside_task_execution(),
            Err(TrackerError::Disposed)
        ));
        assert!(!strict.is_currently_inside_task_execution());

        fixture.finish(&OperationDescriptor::task(id(2), None, ":test"));
    }
}
