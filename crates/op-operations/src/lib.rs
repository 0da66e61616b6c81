//! Operation tree primitives
//!
//! # Modules
//!
//! - `types`: operation ids, descriptors and lifecycle events
//! - `listener`: lifecycle listeners and the broadcast manager
//! - `current`: the thread-ambient current operation
//! - `ancestry`: ancestry walks over parent links
//! - `executor`: runs closures as operations
//! - `error`: error types and Result alias

pub mod ancestry;
pub mod current;
pub mod error;
pub mod executor;
pub mod listener;
pub mod types;

// Re-exports
pub use ancestry::{AncestryTracker, ParentMapAncestryTracker};
pub use current::{CurrentOperationRef, CurrentOperationSource, OperationRef};
pub use error::{OperationError, Result};
pub use executor::OperationExecutor;
pub use listener::{OperationListener, OperationListenerManager};
pub use types::{
    OperationDescriptor, OperationDetails, OperationFinishEvent, OperationId, OperationIdFactory,
    OperationProgressEvent, OperationStartEvent,
};
