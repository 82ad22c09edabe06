use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use event_transport::{EventTransport, TransportSignal};
use events_api::BackfillSource;
use session_store::SessionSink;
use session_wire::{ClientMessage, PermissionOutcome, ServerMessage};

use crate::backfill::{BackfillCoordinator, BackfillMessage};
use crate::config::SyncConfig;
use crate::engine::{SyncDirective, SyncEngine};
use crate::error::SyncError;
use crate::notify::{NotifyFn, SyncNotification};

enum SyncCommand {
    Subscribe {
        session_id: String,
    },
    Unsubscribe {
        session_id: String,
    },
    SubmitPermissionDecision {
        session_id: String,
        request_id: String,
        outcome: PermissionOutcome,
    },
    Shutdown,
}

/// Handle to a running [`SyncRuntime`]. Cheap to clone; commands are queued
/// and handled on the runtime's single task in arrival order.
#[derive(Clone)]
pub struct SyncHandle {
    commands: UnboundedSender<SyncCommand>,
}

impl SyncHandle {
    pub fn subscribe(&self, session_id: &str) -> Result<(), SyncError> {
        self.send(SyncCommand::Subscribe {
            session_id: session_id.to_string(),
        })
    }

    pub fn unsubscribe(&self, session_id: &str) -> Result<(), SyncError> {
        self.send(SyncCommand::Unsubscribe {
            session_id: session_id.to_string(),
        })
    }

    pub fn submit_permission_decision(
        &self,
        session_id: &str,
        request_id: &str,
        outcome: PermissionOutcome,
    ) -> Result<(), SyncError> {
        self.send(SyncCommand::SubmitPermissionDecision {
            session_id: session_id.to_string(),
            request_id: request_id.to_string(),
            outcome,
        })
    }

    pub fn shutdown(&self) -> Result<(), SyncError> {
        self.send(SyncCommand::Shutdown)
    }

    fn send(&self, command: SyncCommand) -> Result<(), SyncError> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::RuntimeStopped)
    }
}

/// The synchronization runtime: one task that owns the engine and the
/// backfill coordinator, fed by the transport signal stream, backfill task
/// results, and handle commands. All state mutation happens on this task,
/// so transport delivery, backfill application, and commands interleave at
/// message granularity and never race.
pub struct SyncRuntime {
    task: JoinHandle<()>,
    handle: SyncHandle,
}

impl SyncRuntime {
    pub fn spawn(
        transport: Arc<dyn EventTransport>,
        signals: UnboundedReceiver<TransportSignal>,
        source: Arc<dyn BackfillSource>,
        sink: Arc<dyn SessionSink>,
        config: SyncConfig,
        notify: NotifyFn,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (backfill_tx, backfill_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            transport,
            sink: Arc::clone(&sink),
            engine: SyncEngine::new(sink, config.clone()),
            coordinator: BackfillCoordinator::new(source, config.backfill_page_limit, backfill_tx),
            notify,
            announced: HashSet::new(),
        };
        let task = tokio::spawn(worker.run(signals, backfill_rx, command_rx));

        Self {
            task,
            handle: SyncHandle {
                commands: command_tx,
            },
        }
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Request shutdown and wait for the runtime task to finish.
    pub async fn shutdown(self) {
        let _ = self.handle.shutdown();
        let _ = self.task.await;
    }
}

struct Worker {
    transport: Arc<dyn EventTransport>,
    sink: Arc<dyn SessionSink>,
    engine: SyncEngine,
    coordinator: BackfillCoordinator,
    notify: NotifyFn,
    /// Sessions announced over the current connection. The subscribe
    /// command and the `Connected` signal race on separate channels; this
    /// set keeps each session's `Subscribe` frame to one per connection.
    announced: HashSet<String>,
}

impl Worker {
    async fn run(
        mut self,
        mut signals: UnboundedReceiver<TransportSignal>,
        mut backfill: UnboundedReceiver<BackfillMessage>,
        mut commands: UnboundedReceiver<SyncCommand>,
    ) {
        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(signal) => self.handle_signal(signal).await,
                    None => {
                        debug!("transport signal channel closed, stopping runtime");
                        break;
                    }
                },
                message = backfill.recv() => {
                    if let Some(message) = message {
                        self.handle_backfill(message);
                    }
                },
                command = commands.recv() => match command {
                    Some(SyncCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
            }
        }
        self.coordinator.cancel_all();
    }

    async fn handle_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Connected => {
                let (reconnect, directives) = self.engine.on_connect();
                for session_id in self.engine.subscribed_sessions() {
                    if self.announced.insert(session_id.clone()) {
                        self.send_to_transport(ClientMessage::Subscribe { session_id })
                            .await;
                    }
                }
                self.process_directives(directives);
                if reconnect {
                    let sessions = self.engine.subscribed_sessions();
                    debug!(count = sessions.len(), "reconnected, catching up sessions");
                    (self.notify)(SyncNotification::ReconnectRecovery { sessions });
                }
            }
            TransportSignal::Disconnected { reason } => {
                self.announced.clear();
                self.engine.on_disconnect(&reason);
            }
            TransportSignal::Message(message) => self.handle_server_message(message),
        }
    }

    fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::SessionEvent(event) => {
                let directives = self.engine.ingest(event);
                self.process_directives(directives);
            }
            ServerMessage::SessionAttached {
                session_id,
                attachment,
                ..
            } => {
                self.engine.on_attached(&session_id, &attachment);
            }
            ServerMessage::SessionDetached {
                session_id, reason, ..
            } => {
                self.engine.on_detached(&session_id, reason.as_deref());
            }
            ServerMessage::PermissionRequest {
                session_id,
                request,
            } => {
                self.sink.add_permission_request(&session_id, request);
            }
            ServerMessage::PermissionResult {
                session_id,
                request_id,
                outcome,
            } => {
                self.sink
                    .set_permission_outcome(&session_id, &request_id, outcome);
            }
        }
    }

    fn handle_backfill(&mut self, message: BackfillMessage) {
        match message {
            BackfillMessage::Page {
                session_id,
                generation,
                events,
            } => {
                if !self.coordinator.is_current(&session_id, generation) {
                    trace!(session_id, generation, "dropping page from stale backfill");
                    return;
                }
                for event in events {
                    let directives = self.engine.ingest(event);
                    self.process_directives(directives);
                    // A reset mid-page retires this generation; the rest of
                    // the page belongs to the superseded attempt.
                    if !self.coordinator.is_current(&session_id, generation) {
                        return;
                    }
                }
            }
            BackfillMessage::Completed {
                session_id,
                generation,
                fetched,
            } => {
                if !self.coordinator.is_current(&session_id, generation) {
                    trace!(session_id, generation, "dropping stale backfill completion");
                    return;
                }
                let after_seq = self.coordinator.after_seq_at_start(&session_id);
                self.coordinator.finish(&session_id, generation);
                self.sink.set_session_backfilling(&session_id, false);
                let directives = self.engine.handle_backfill_complete(&session_id, after_seq);
                (self.notify)(SyncNotification::BackfillCompleted {
                    session_id: session_id.clone(),
                    fetched,
                });
                self.process_directives(directives);
            }
            BackfillMessage::Failed {
                session_id,
                generation,
                error,
            } => {
                if !self.coordinator.is_current(&session_id, generation) {
                    return;
                }
                warn!(session_id, error, "backfill failed");
                self.coordinator.finish(&session_id, generation);
                self.sink.set_session_backfilling(&session_id, false);
                self.engine.handle_backfill_failed(&session_id);
                (self.notify)(SyncNotification::BackfillFailed { session_id, error });
            }
            BackfillMessage::RevisionMismatch {
                session_id,
                generation,
                actual_revision,
            } => {
                if !self.coordinator.is_current(&session_id, generation) {
                    return;
                }
                let retries = self.coordinator.mismatch_retries(&session_id);
                if retries < self.engine.config().revision_mismatch_retry_limit {
                    debug!(
                        session_id,
                        actual_revision,
                        attempt = retries + 1,
                        "server is on a different revision, rebuilding"
                    );
                    self.engine.reset_to_revision(&session_id, actual_revision);
                    self.engine.mark_backfill_armed(&session_id);
                    self.sink.set_session_backfilling(&session_id, true);
                    (self.notify)(SyncNotification::RevisionReset {
                        session_id: session_id.clone(),
                        revision: actual_revision,
                    });
                    self.coordinator
                        .start(&session_id, actual_revision, 0, retries + 1);
                } else {
                    warn!(
                        session_id,
                        retries, "revision mismatch retry limit reached, degrading"
                    );
                    self.coordinator.finish(&session_id, generation);
                    self.sink.set_session_backfilling(&session_id, false);
                    self.engine.degrade_after_mismatch(&session_id);
                    (self.notify)(SyncNotification::BackfillFailed {
                        session_id,
                        error: "revision mismatch retry limit reached".to_string(),
                    });
                }
            }
        }
    }

    async fn handle_command(&mut self, command: SyncCommand) {
        match command {
            SyncCommand::Subscribe { session_id } => {
                self.engine.subscribe(&session_id);
                if self.transport.is_connected() && self.announced.insert(session_id.clone()) {
                    self.send_to_transport(ClientMessage::Subscribe { session_id })
                        .await;
                }
            }
            SyncCommand::Unsubscribe { session_id } => {
                let directives = self.engine.unsubscribe(&session_id);
                self.process_directives(directives);
                self.announced.remove(&session_id);
                if self.transport.is_connected() {
                    self.send_to_transport(ClientMessage::Unsubscribe { session_id })
                        .await;
                }
            }
            SyncCommand::SubmitPermissionDecision {
                session_id,
                request_id,
                outcome,
            } => {
                self.send_to_transport(ClientMessage::SubmitPermissionDecision {
                    session_id,
                    request_id,
                    outcome,
                })
                .await;
            }
            SyncCommand::Shutdown => {}
        }
    }

    fn process_directives(&mut self, directives: Vec<SyncDirective>) {
        for directive in directives {
            match directive {
                SyncDirective::StartBackfill {
                    session_id,
                    revision,
                    after_seq,
                } => {
                    self.sink.set_session_backfilling(&session_id, true);
                    self.coordinator.start(&session_id, revision, after_seq, 0);
                }
                SyncDirective::CancelBackfill { session_id } => {
                    self.coordinator.cancel(&session_id);
                    self.sink.set_session_backfilling(&session_id, false);
                }
            }
        }
    }

    async fn send_to_transport(&mut self, message: ClientMessage) {
        if let Err(err) = self.transport.send(message).await {
            warn!(error = %err, "failed to send over transport");
        }
    }
}
