//! Client-side synchronization of live session event streams.
//!
//! A session's history is an ordered log of events, numbered by a
//! `(revision, seq)` cursor: `seq` increases by one per event within a
//! revision, and the server bumps `revision` when it rewrites history (fork,
//! compaction, rollback). This crate keeps a local session store converged
//! with that log across out-of-order delivery, dropped messages, transport
//! reconnects, and revision bumps:
//!
//! - [`SyncEngine`] is the pure state machine: it classifies each incoming
//!   event against the session cursor, applies or buffers it, and emits
//!   [`SyncDirective`]s when a gap or revision change calls for a backfill.
//! - [`BackfillCoordinator`] runs at most one paginated catch-up fetch per
//!   session, generation-fenced so superseded fetches cannot corrupt state.
//! - [`SyncRuntime`] is the single task that owns both and serializes live
//!   traffic, backfill results, and caller commands.
//!
//! Wire types live in `session_wire`, the HTTP backfill client in
//! `events_api`, the WebSocket transport in `event_transport`, and the
//! store-side sink trait in `session_store`.

mod backfill;
mod config;
mod cursor;
mod dispatch;
mod engine;
mod error;
mod notify;
mod pending;
mod runtime;

pub use backfill::{BackfillCoordinator, BackfillMessage};
pub use config::SyncConfig;
pub use cursor::{Admission, SessionCursor, SyncStatus};
pub use dispatch::dispatch_event;
pub use engine::{SyncDirective, SyncEngine};
pub use error::SyncError;
pub use notify::{noop_notify, NotifyFn, SyncNotification};
pub use pending::{InsertOutcome, PendingBuffer};
pub use runtime::{SyncHandle, SyncRuntime};

pub use event_transport::{
    ChannelTransport, EventTransport, TransportError, TransportSignal, WebSocketConfig,
    WebSocketTransport,
};
pub use events_api::{
    BackfillSource, CancellationSignal, EventsApiClient, EventsApiConfig, EventsApiError,
};
pub use session_store::{MemorySessionStore, SessionSink};
pub use session_wire::{
    kind, ClientMessage, EventsPage, PermissionOutcome, PermissionRequest, ServerMessage,
    SessionAttachment, SessionEvent,
};
