//! In-memory instance store for kubroker.
//!
//! Provides an implementation of [`kubroker_storage::InstanceStore`] backed by
//! a papaya lock-free HashMap. Records live only as long as the process.
//!
//! # Example
//!
//! ```ignore
//! use kubroker_db_memory::InMemoryInstanceStore;
//! use kubroker_storage::InstanceStore;
//!
//! let store = InMemoryInstanceStore::new();
//! store.insert(&record).await?;
//! assert!(store.get("i1").await?.is_some());
//! ```

mod storage;

pub use kubroker_storage::{InstanceStore, StorageError};
pub use storage::InMemoryInstanceStore;
