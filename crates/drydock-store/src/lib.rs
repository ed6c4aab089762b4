//! drydock-store — JSON-persisted record store for drydock.
//!
//! Holds the two persisted collections the lifecycle core works against:
//! [`InstanceRecord`](drydock_core::InstanceRecord)s and
//! [`ScheduleTask`](drydock_core::ScheduleTask)s. Each collection is a
//! single human-editable JSON document guarded by its own reader-writer
//! lock and flushed to disk synchronously on every mutation, so a process
//! crash never loses an acknowledged write.
//!
//! The `Store` is `Clone` + `Send` + `Sync` (an `Arc` around its state) and
//! is shared by reference across async tasks.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::Store;
