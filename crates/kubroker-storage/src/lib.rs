//! # kubroker-storage
//!
//! Persistence abstraction for instance records.
//!
//! This crate only defines the [`InstanceStore`] contract and its error type.
//! Backends live in `kubroker-db-memory` and `kubroker-db-postgres`.

mod error;
mod traits;

pub use error::{ErrorCategory, StorageError};
pub use traits::InstanceStore;

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Shared handle to a store backend.
pub type DynInstanceStore = std::sync::Arc<dyn InstanceStore>;
