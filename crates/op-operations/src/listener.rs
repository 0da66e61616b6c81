//! Operation lifecycle listeners and their broadcast manager
//!
//! Every operation in the process is announced to the registered listeners
//! as `started`, any number of `progress` notifications, then `finished`.
//! Notifications arrive on whatever thread runs the operation.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{OperationError, Result};
use crate::types::{
    OperationDescriptor, OperationFinishEvent, OperationId, OperationProgressEvent,
    OperationStartEvent,
};

/// Receives lifecycle notifications for every operation
pub trait OperationListener: Send + Sync {
    /// Name used when reporting failures of this listener
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn started(&self, descriptor: &OperationDescriptor, event: &OperationStartEvent) -> Result<()>;

    fn progress(&self, _id: OperationId, _event: &OperationProgressEvent) {}

    fn finished(&self, descriptor: &OperationDescriptor, event: &OperationFinishEvent)
        -> Result<()>;
}

fn same_listener<A, B>(a: &Arc<A>, b: &Arc<B>) -> bool
where
    A: OperationListener + ?Sized,
    B: OperationListener + ?Sized,
{
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// Fan-out of operation notifications to registered listeners
///
/// A delivery holds the listener list for reading, so `remove_listener`
/// only returns once no notification to the removed listener is in flight.
/// Listeners must not add or remove listeners from inside a callback.
#[derive(Default)]
pub struct OperationListenerManager {
    listeners: RwLock<Vec<Arc<dyn OperationListener>>>,
}

impl OperationListenerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns false if it was already registered.
    pub fn add_listener(&self, listener: Arc<dyn OperationListener>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        debug!(listener = listener.name(), "Adding operation listener");
        listeners.push(listener);
        true
    }

    /// Unregister a listener. Returns false if it was not registered.
    pub fn remove_listener<L>(&self, listener: &Arc<L>) -> bool
    where
        L: OperationListener + ?Sized,
    {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        let removed = listeners.len() != before;
        if removed {
            debug!(listener = listener.name(), "Removed operation listener");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver `started` to every listener in registration order.
    ///
    /// A failing listener does not prevent delivery to the others; all
    /// failures are logged and returned.
    pub fn started(
        &self,
        descriptor: &OperationDescriptor,
        event: &OperationStartEvent,
    ) -> Vec<OperationError> {
        let listeners = self.listeners.read();
        let mut failures = Vec::new();
        for listener in listeners.iter() {
            if let Err(e) = listener.started(descriptor, event) {
                error!(
                    listener = listener.name(),
                    operation = %descriptor,
                    error = %e,
                    "Listener failed on operation start"
                );
                failures.push(OperationError::listener_failed(listener.name(), e.to_string()));
            }
        }
        failures
    }

    pub fn progress(&self, id: OperationId, event: &OperationProgressEvent) {
        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            listener.progress(id, event);
        }
    }

    /// Deliver `finished` in reverse registration order, isolating failures
    /// like [`started`](Self::started).
    pub fn finished(
        &self,
        descriptor: &OperationDescriptor,
        event: &OperationFinishEvent,
    ) -> Vec<OperationError> {
        let listeners = self.listeners.read();
        let mut failures = Vec::new();
        for listener in listeners.iter().rev() {
            if let Err(e) = listener.finished(descriptor, event) {
                error!(
                    listener = listener.name(),
                    operation = %descriptor,
                    error = %e,
                    "Listener failed on operation finish"
                );
                failures.push(OperationError::listener_failed(listener.name(), e.to_string()));
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationDetails;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl OperationListener for Recording {
        fn name(&self) -> &str {
            self.label
        }

        fn started(&self, descriptor: &OperationDescriptor, _: &OperationStartEvent) -> Result<()> {
            self.log.lock().push(format!("{} started {}", self.label, descriptor.name));
            if self.fail {
                return Err(OperationError::missing_id("boom"));
            }
            Ok(())
        }

        fn finished(&self, descriptor: &OperationDescriptor, _: &OperationFinishEvent) -> Result<()> {
            self.log.lock().push(format!("{} finished {}", self.label, descriptor.name));
            Ok(())
        }
    }

    fn descriptor() -> OperationDescriptor {
        OperationDescriptor::new(OperationId::new(1), None, "op", OperationDetails::other("test"))
    }

    #[test]
    fn test_delivery_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = OperationListenerManager::new();
        manager.add_listener(Arc::new(Recording { label: "a", log: log.clone(), fail: false }));
        manager.add_listener(Arc::new(Recording { label: "b", log: log.clone(), fail: false }));

        let start = OperationStartEvent::now();
        assert!(manager.started(&descriptor(), &start).is_empty());
        assert!(manager
            .finished(&descriptor(), &OperationFinishEvent::succeeded(start.start_time))
            .is_empty());

        assert_eq!(
            *log.lock(),
            vec!["a started op", "b started op", "b finished op", "a finished op"]
        );
    }

    #[test]
    fn test_failure_is_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = OperationListenerManager::new();
        manager.add_listener(Arc::new(Recording { label: "bad", log: log.clone(), fail: true }));
        manager.add_listener(Arc::new(Recording { label: "good", log: log.clone(), fail: false }));

        let failures = manager.started(&descriptor(), &OperationStartEvent::now());
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            OperationError::ListenerFailed { listener, .. } if listener == "bad"
        ));
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_add_and_remove_by_identity() {
        let manager = OperationListenerManager::new();
        let listener: Arc<dyn OperationListener> = Arc::new(Recording::default());
        assert!(manager.add_listener(listener.clone()));
        assert!(!manager.add_listener(listener.clone()));
        assert_eq!(manager.listener_count(), 1);

        let other = Arc::new(Recording::default());
        assert!(!manager.remove_listener(&other));
        assert!(manager.remove_listener(&listener));
        assert_eq!(manager.listener_count(), 0);
    }
}
