use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("State storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Failed to encode or decode state: {0}")]
    Codec(#[from] bincode::Error),

    #[error("State transaction aborted: {0}")]
    Aborted(String),
}

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("Failed to read migration state: {0}")]
    State(#[from] StateStoreError),
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Job '{0}' has no registered handler")]
    UnknownJob(String),

    #[error("Scheduler rejected job: {0}")]
    Rejected(String),

    #[error("Scheduler is shut down")]
    Closed,
}
