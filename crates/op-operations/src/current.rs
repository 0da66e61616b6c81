//! Thread-ambient current operation
//!
//! Each thread knows which operation, if any, it is currently executing
//! within. Work handed to another thread keeps its place in the operation
//! tree by capturing [`CurrentOperationRef::get`] and re-entering it with
//! [`CurrentOperationRef::with`] on the new thread.

use serde::{Deserialize, Serialize};
use std::cell::Cell;

use crate::types::{OperationDescriptor, OperationId};

/// Reference to a running operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationRef {
    pub id: OperationId,
    pub parent_id: Option<OperationId>,
}

impl OperationRef {
    pub fn new(id: OperationId, parent_id: Option<OperationId>) -> Self {
        Self { id, parent_id }
    }

    /// Reference for a descriptor, if it carries an id
    pub fn from_descriptor(descriptor: &OperationDescriptor) -> Option<Self> {
        descriptor.id.map(|id| Self::new(id, descriptor.parent_id))
    }
}

thread_local! {
    static CURRENT_OPERATION: Cell<Option<OperationRef>> = const { Cell::new(None) };
}

/// Accessor for the calling thread's current operation
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentOperationRef;

impl CurrentOperationRef {
    pub fn get() -> Option<OperationRef> {
        CURRENT_OPERATION.with(Cell::get)
    }

    pub fn id() -> Option<OperationId> {
        Self::get().map(|op| op.id)
    }

    pub fn parent_id() -> Option<OperationId> {
        Self::get().and_then(|op| op.parent_id)
    }

    /// Replace the current operation, returning the previous one
    pub fn set(operation: Option<OperationRef>) -> Option<OperationRef> {
        CURRENT_OPERATION.with(|current| current.replace(operation))
    }

    pub fn clear() {
        Self::set(None);
    }

    /// Run `f` with `operation` as the current operation.
    ///
    /// The previous operation is restored afterwards, including when `f`
    /// panics.
    pub fn with<T>(operation: Option<OperationRef>, f: impl FnOnce() -> T) -> T {
        let _guard = CurrentOperationGuard {
            prev: Self::set(operation),
        };
        f()
    }
}

/// Restores the previous current operation on drop
struct CurrentOperationGuard {
    prev: Option<OperationRef>,
}

impl Drop for CurrentOperationGuard {
    fn drop(&mut self) {
        CurrentOperationRef::set(self.prev.take());
    }
}

/// Read-only source of the calling thread's current operation
pub trait CurrentOperationSource: Send + Sync {
    fn current_operation(&self) -> Option<OperationRef>;

    fn current_operation_id(&self) -> Option<OperationId> {
        self.current_operation().map(|op| op.id)
    }
}

impl CurrentOperationSource for CurrentOperationRef {
    fn current_operation(&self) -> Option<OperationRef> {
        CurrentOperationRef::get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn op(id: u64, parent: Option<u64>) -> OperationRef {
        OperationRef::new(OperationId::new(id), parent.map(OperationId::new))
    }

    #[test]
    fn test_with_restores_previous() {
        assert_eq!(CurrentOperationRef::get(), None);
        CurrentOperationRef::with(Some(op(1, None)), || {
            assert_eq!(CurrentOperationRef::id(), Some(OperationId::new(1)));
            CurrentOperationRef::with(Some(op(2, Some(1))), || {
                assert_eq!(CurrentOperationRef::parent_id(), Some(OperationId::new(1)));
            });
            assert_eq!(CurrentOperationRef::id(), Some(OperationId::new(1)));
        });
        assert_eq!(CurrentOperationRef::get(), None);
    }

    #[test]
    fn test_restored_after_panic() {
        let result = std::panic::catch_unwind(|| {
            CurrentOperationRef::with(Some(op(7, None)), || panic!("task failed"));
        });
        assert!(result.is_err());
        assert_eq!(CurrentOperationRef::get(), None);
    }

    #[test]
    fn test_is_thread_local() {
        CurrentOperationRef::with(Some(op(3, None)), || {
            let seen = thread::spawn(CurrentOperationRef::id).join().unwrap();
            assert_eq!(seen, None);

            let captured = CurrentOperationRef::get();
            let propagated = thread::spawn(move || {
                CurrentOperationRef::with(captured, CurrentOperationRef::id)
            })
            .join()
            .unwrap();
            assert_eq!(propagated, Some(OperationId::new(3)));
        });
    }

    #[test]
    fn test_source_reads_ambient_state() {
        let source = CurrentOperationRef;
        assert_eq!(source.current_operation_id(), None);
        CurrentOperationRef::with(Some(op(9, None)), || {
            assert_eq!(source.current_operation_id(), Some(OperationId::new(9)));
        });
    }
}
