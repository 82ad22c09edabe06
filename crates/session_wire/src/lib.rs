//! Wire-level types for the session event synchronization protocol.
//!
//! This crate owns the shapes that cross process boundaries only: the
//! `(revision, seq)`-stamped session event, the transport message envelopes,
//! and the paginated backfill page. It intentionally contains no I/O and no
//! ordering logic; admission decisions live in the engine.

pub mod event;
pub mod message;
pub mod page;

pub use event::{
    kind, PermissionOutcome, PermissionRequest, PermissionResultPayload, SessionEvent,
    SessionMetaUpdate, StreamErrorPayload, TerminalOutputPayload, TextChunkPayload, ToolCallState,
    ToolCallStatus,
};
pub use message::{parse_server_message, ClientMessage, ServerMessage, SessionAttachment};
pub use page::EventsPage;
