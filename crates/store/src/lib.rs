//! Persisted key→value byte store backing global-tier models.
//!
//! The model layer treats this as an opaque durable store: `get`/`put`/
//! `delete`/`clear` keyed by stable string ids. Two backends ship here:
//! [`MemoryStore`] for ephemeral processes and tests, [`DiskStore`] for
//! values that must survive a restart. Writes are last-write-wins; no
//! cross-process locking is provided (staleness is bounded by the model
//! layer's reset policies).

mod disk;
mod error;
mod memory;
mod store;

pub use disk::DiskStore;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use store::CacheStore;
