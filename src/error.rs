use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The runtime task has stopped; commands can no longer be delivered.
    #[error("synchronization runtime is no longer running")]
    RuntimeStopped,
}
