use crate::{
    error::WorkerError,
    host::HostLayout,
    media::{library::MediaLibrary, urls::UrlMapper},
    rewrite::table::TableRewriter,
};
use bytes::Bytes;
use connectors::blob::{BlobStore, content_type_for, error::BlobError};
use engine_core::{
    metrics::Metrics,
    retry::{RetryDisposition, RetryPolicy},
    state::{CounterUpdate, StateStore},
};
use model::{
    chunk::ChunkPayload,
    media::{MediaId, MediaItem, RemoteObject},
    migration::{CounterDelta, MigrationState},
};
use std::{collections::BTreeSet, path::PathBuf, sync::Arc};
use tracing::{debug, error, info, warn};

/// Where an item stands within one chunk run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Uploaded,
    UploadFailed,
    Rewritten,
    RewriteSkipped,
    Counted,
}

impl ItemState {
    /// Counter increment for an item that reached `self` before being counted.
    pub fn delta(self) -> CounterDelta {
        match self {
            ItemState::Rewritten | ItemState::RewriteSkipped => CounterDelta::success(),
            ItemState::Pending | ItemState::Uploaded | ItemState::UploadFailed => {
                CounterDelta::failure()
            }
            ItemState::Counted => CounterDelta::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkReport {
    pub index: usize,
    pub succeeded: u64,
    pub failed: u64,
    /// Items not counted because the run was superseded mid-chunk.
    pub abandoned: u64,
}

/// Everything a worker needs besides the chunk itself.
pub struct WorkerContext {
    pub library: Arc<dyn MediaLibrary>,
    pub blobs: Arc<dyn BlobStore>,
    pub rewriter: Arc<TableRewriter>,
    pub state: Arc<dyn StateStore>,
    pub urls: UrlMapper,
    pub layout: HostLayout,
    pub uploads_dir: PathBuf,
    pub retry: RetryPolicy,
    pub metrics: Metrics,
}

/// Processes one chunk: upload, rewrite references, count.
#[derive(Clone)]
pub struct ChunkWorker {
    ctx: Arc<WorkerContext>,
}

impl ChunkWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        ChunkWorker { ctx: Arc::new(ctx) }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.ctx.metrics
    }

    /// Entry point for the scheduler.
    pub async fn handle(&self, payload: serde_json::Value) -> Result<ChunkReport, WorkerError> {
        let payload: ChunkPayload = serde_json::from_value(payload)?;
        self.run_chunk(&payload).await
    }

    pub async fn run_chunk(&self, payload: &ChunkPayload) -> Result<ChunkReport, WorkerError> {
        let state = self.current_run(&payload.run_id).await?;
        let tables = self.target_tables(&state);

        info!(
            run_id = %payload.run_id,
            chunk = payload.index,
            items = payload.chunk.len(),
            "Processing chunk"
        );

        let mut report = ChunkReport {
            index: payload.index,
            ..ChunkReport::default()
        };

        for (pos, &id) in payload.chunk.iter().enumerate() {
            let reached = self.process_item(id, &tables, &state).await;
            let delta = reached.delta();

            match self.ctx.state.record(&payload.run_id, delta).await? {
                CounterUpdate::Applied { .. } => {
                    debug!(media_id = %id, state = ?reached, next = ?ItemState::Counted, "Item counted");
                    if delta.errors > 0 {
                        report.failed += 1;
                        self.ctx.metrics.increment_failures(1);
                    } else {
                        report.succeeded += 1;
                    }
                }
                CounterUpdate::StaleRun { current } => {
                    report.abandoned = (payload.chunk.len() - pos) as u64;
                    warn!(
                        chunk_run = %payload.run_id,
                        current_run = %current,
                        chunk = payload.index,
                        abandoned = report.abandoned,
                        "Run superseded, abandoning chunk"
                    );
                    break;
                }
                CounterUpdate::NoMigration => return Err(WorkerError::NoMigration),
            }
        }

        self.ctx.metrics.increment_chunks(1);
        let snapshot = self.ctx.metrics.snapshot();
        info!(
            chunk = payload.index,
            succeeded = report.succeeded,
            failed = report.failed,
            uploaded = snapshot.items_uploaded,
            bytes = snapshot.bytes_uploaded,
            rows = snapshot.rows_rewritten,
            retries = snapshot.retry_count,
            "Chunk finished"
        );
        Ok(report)
    }

    async fn current_run(&self, run_id: &str) -> Result<MigrationState, WorkerError> {
        let state = self
            .ctx
            .state
            .load_state()
            .await?
            .ok_or(WorkerError::NoMigration)?;
        if state.run_id != run_id {
            return Err(WorkerError::StaleRun {
                chunk_run: run_id.to_string(),
                current_run: state.run_id,
            });
        }
        Ok(state)
    }

    fn target_tables(&self, state: &MigrationState) -> BTreeSet<String> {
        let mut tables: BTreeSet<String> = self.ctx.layout.content_tables().into_iter().collect();
        tables.extend(state.selected_tables.iter().cloned());
        tables
    }

    /// Drives one item as far as it gets; the returned state decides how it is counted.
    async fn process_item(
        &self,
        id: MediaId,
        tables: &BTreeSet<String>,
        state: &MigrationState,
    ) -> ItemState {
        let item = match self.ctx.library.fetch(id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                warn!(media_id = %id, "Media item has no stored file reference");
                return ItemState::Pending;
            }
            Err(err) => {
                warn!(media_id = %id, error = %err, "Media metadata unreadable");
                return ItemState::Pending;
            }
        };

        let url = match self.upload_item(&item).await {
            Ok(url) => url,
            Err(err) => {
                error!(media_id = %id, error = %err, "Upload failed");
                return ItemState::UploadFailed;
            }
        };
        debug!(media_id = %id, %url, "Uploaded");

        // Computed once from the original paths, before any table is touched.
        let jobs = self.ctx.urls.rewrite_jobs(&item);
        let reached = if jobs.is_empty() {
            ItemState::RewriteSkipped
        } else {
            for job in &jobs {
                let stats = self
                    .ctx
                    .rewriter
                    .rewrite_tables(tables, job, state.strategy)
                    .await;
                self.ctx.metrics.increment_rows(stats.rows_updated);
                if stats.rows_failed > 0 || stats.tables_failed > 0 {
                    warn!(
                        media_id = %id,
                        rows_failed = stats.rows_failed,
                        tables_failed = stats.tables_failed,
                        old = %job.old,
                        "Some rewrites failed"
                    );
                }
            }
            ItemState::Rewritten
        };

        let remote = RemoteObject {
            bucket: self.ctx.blobs.bucket().to_string(),
            key: self.ctx.urls.object_key(&item.relative_path),
            url,
        };
        if let Err(err) = self.ctx.library.mark_offloaded(id, &remote).await {
            error!(media_id = %id, error = %err, "Failed to record remote location");
            return ItemState::Uploaded;
        }

        reached
    }

    /// Uploads the original and every size; returns the original's URL.
    async fn upload_item(&self, item: &MediaItem) -> Result<String, BlobError> {
        let mut main_url = None;
        for relative in item.meta.relative_paths() {
            let declared = if relative == item.relative_path {
                item.mime.clone()
            } else {
                item.meta
                    .sizes
                    .iter()
                    .find(|s| relative.ends_with(&s.file))
                    .and_then(|s| s.mime.clone())
            };
            let content_type = declared.unwrap_or_else(|| content_type_for(&relative));

            let url = self.upload_file(&relative, &content_type).await?;
            if main_url.is_none() {
                main_url = Some(url);
            }
        }
        main_url.ok_or_else(|| BlobError::Exception("item has no files".into()))
    }

    async fn upload_file(&self, relative: &str, content_type: &str) -> Result<String, BlobError> {
        let path = self.ctx.uploads_dir.join(relative);
        let content = Bytes::from(tokio::fs::read(&path).await.map_err(|e| {
            BlobError::Exception(format!("cannot read {}: {e}", path.display()))
        })?);
        let key = self.ctx.urls.object_key(relative);
        let size = content.len() as u64;

        let stored = self
            .ctx
            .retry
            .run_observed(
                || self.ctx.blobs.put(&key, content.clone(), content_type),
                |err: &BlobError| {
                    if err.is_retryable() {
                        RetryDisposition::Retry
                    } else {
                        RetryDisposition::Stop
                    }
                },
                |err, attempt| {
                    self.ctx.metrics.increment_retries(1);
                    warn!(key = %key, attempt, error = %err, "Retrying upload");
                },
            )
            .await
            .map_err(|e| e.into_inner())?;

        self.ctx.metrics.increment_uploads(1);
        self.ctx.metrics.increment_bytes(size);
        Ok(stored.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_completed_rewrites_count_as_success() {
        assert_eq!(ItemState::Rewritten.delta(), CounterDelta::success());
        assert_eq!(ItemState::RewriteSkipped.delta(), CounterDelta::success());
        assert_eq!(ItemState::UploadFailed.delta(), CounterDelta::failure());
        assert_eq!(ItemState::Pending.delta(), CounterDelta::failure());
        assert_eq!(ItemState::Uploaded.delta(), CounterDelta::failure());
        assert!(ItemState::Counted.delta().is_empty());
    }
}
