//! State management module for pteraform.
//!
//! The local driver plays the host's part: it persists the record of every
//! unit between runs and hands it back to the reconciler.

mod store;
mod local;
mod lock;
mod types;

pub use store::{release_after, StateStore};
pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{generate_holder_id, LockInfo, LOCK_EXPIRY_SECS};
pub use types::{HistoryEntry, ProviderState, UnitState, STATE_VERSION};
