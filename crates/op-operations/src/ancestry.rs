//! Ancestry walks over the operation tree

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{OperationError, Result};
use crate::listener::OperationListener;
use crate::types::{OperationDescriptor, OperationFinishEvent, OperationId, OperationStartEvent};

/// Walk from `start` (inclusive) towards the root and return the first id
/// accepted by `predicate`.
///
/// `parent_of` is consulted once per visited id and `predicate` is evaluated
/// at most once per id. The walk ends at the first id without a parent.
pub fn find_closest_matching_ancestor(
    start: Option<OperationId>,
    parent_of: impl Fn(OperationId) -> Option<OperationId>,
    mut predicate: impl FnMut(OperationId) -> bool,
) -> Option<OperationId> {
    let mut current = start;
    while let Some(id) = current {
        if predicate(id) {
            return Some(id);
        }
        current = parent_of(id);
    }
    None
}

/// Answers ancestry questions about running operations
pub trait AncestryTracker: Send + Sync {
    fn find_closest_matching_ancestor(
        &self,
        start: Option<OperationId>,
        predicate: &dyn Fn(OperationId) -> bool,
    ) -> Option<OperationId>;
}

/// Ancestry tracker fed by operation notifications.
///
/// Parent links are recorded when an operation starts and forgotten when it
/// finishes. Register it with the listener manager before any listener whose
/// queries depend on it.
#[derive(Debug, Default)]
pub struct ParentMapAncestryTracker {
    parents: RwLock<HashMap<OperationId, OperationId>>,
}

impl ParentMapAncestryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: OperationId, parent_id: OperationId) {
        self.parents.write().insert(id, parent_id);
    }

    pub fn forget(&self, id: OperationId) {
        self.parents.write().remove(&id);
    }

    pub fn parent_of(&self, id: OperationId) -> Option<OperationId> {
        self.parents.read().get(&id).copied()
    }

    /// Number of operations with a recorded parent
    pub fn len(&self) -> usize {
        self.parents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First non-`None` result of `lookup` along the chain from `start`
    pub fn find_closest_existing_ancestor<T>(
        &self,
        start: Option<OperationId>,
        lookup: impl Fn(OperationId) -> Option<T>,
    ) -> Option<T> {
        let mut found = None;
        find_closest_matching_ancestor(
            start,
            |id| self.parent_of(id),
            |id| {
                found = lookup(id);
                found.is_some()
            },
        );
        found
    }
}

impl AncestryTracker for ParentMapAncestryTracker {
    fn find_closest_matching_ancestor(
        &self,
        start: Option<OperationId>,
        predicate: &dyn Fn(OperationId) -> bool,
    ) -> Option<OperationId> {
        find_closest_matching_ancestor(start, |id| self.parent_of(id), predicate)
    }
}

impl OperationListener for ParentMapAncestryTracker {
    fn name(&self) -> &str {
        "ancestry-tracker"
    }

    fn started(&self, descriptor: &OperationDescriptor, _event: &OperationStartEvent) -> Result<()> {
        let id = descriptor
            .id
            .ok_or_else(|| OperationError::missing_id(descriptor.to_string()))?;
        if let Some(parent_id) = descriptor.parent_id {
            self.record(id, parent_id);
        }
        Ok(())
    }

    fn finished(&self, descriptor: &OperationDescriptor, _event: &OperationFinishEvent) -> Result<()> {
        let id = descriptor
            .id
            .ok_or_else(|| OperationError::missing_id(descriptor.to_string()))?;
        self.forget(id);
        Ok(())
    }
}
