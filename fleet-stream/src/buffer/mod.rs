//! Buffer layer.
//!
//! Owns per-subscription-key bounded message history with incremental byte
//! accounting. Buffers are a data cache over the registry, never a lifecycle
//! owner: clearing them touches no subscription or listener state.

pub(crate) mod store;

pub use store::BufferEntry;
