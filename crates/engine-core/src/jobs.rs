use crate::error::SchedulerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name under which chunk jobs are scheduled.
pub const CHUNK_JOB_NAME: &str = "offload_migrate_chunk";

/// Group shared by every job of the offload engine.
pub const JOB_GROUP: &str = "media-offload";

/// A unit of deferred work as handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub job_name: String,
    pub payload: serde_json::Value,
    pub not_before: DateTime<Utc>,
    pub group: String,
}

/// Deferred-job capability. Jobs run at or after `not_before`, in no
/// particular order, possibly concurrently.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn schedule(
        &self,
        job_name: &str,
        payload: serde_json::Value,
        not_before: DateTime<Utc>,
        group: &str,
    ) -> Result<(), SchedulerError>;
}
