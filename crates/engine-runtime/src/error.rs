use connectors::{error::AdapterError, sql::base::error::DbError};
use engine_config::error::ConfigError;
use engine_core::error::{ProgressError, SchedulerError, StateStoreError};
use engine_processing::error::{MediaError, ScanError};
use model::media::MediaId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("State store error: {0}")]
    State(#[from] StateStoreError),

    #[error("Progress error: {0}")]
    Progress(#[from] ProgressError),

    #[error("Media library error: {0}")]
    Media(#[from] MediaError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Failed to encode job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Media item {0} not found")]
    MediaNotFound(MediaId),
}

#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Mailbox closed")]
    MailboxClosed,

    #[error("Actor internal error: {0}")]
    Internal(String),
}

impl From<ActorError> for SchedulerError {
    fn from(err: ActorError) -> Self {
        match err {
            ActorError::MailboxClosed => SchedulerError::Closed,
            ActorError::Internal(reason) => SchedulerError::Rejected(reason),
        }
    }
}
