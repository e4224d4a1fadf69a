//! Versioned response cache.
//!
//! This module provides the storage side of the engine:
//! - Named generations, exactly one of which is current
//! - Response snapshots keyed by normalized request identity
//! - All-or-nothing batch writes for precaching
//! - A SQLite backend and a trait seam for others

mod handle;
mod storage;
mod traits;

pub use handle::{CacheStore, Generation};
pub use storage::{CacheStorage, CachedEntry, SqliteStorage};
pub use traits::{CacheResult, CacheSource};
