//! External session store seam for the synchronization engine.
//!
//! The engine treats the store as a write-only sink: it pushes mutations in
//! admission order and never reads session content back to make ordering
//! decisions. `SessionSink` is the full mutation surface; `MemorySessionStore`
//! is a threadsafe reference implementation used by tests and embedders that
//! do not bring their own store.

pub mod memory;
pub mod sink;

pub use memory::{MemorySessionStore, SessionRecord};
pub use sink::SessionSink;
