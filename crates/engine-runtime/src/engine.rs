use crate::{
    coordinator::MigrationCoordinator,
    error::MigrationError,
    scheduler::{JobHandler, JobResult, LocalJobScheduler},
};
use async_trait::async_trait;
use connectors::{
    adapter::Adapter,
    blob::{BlobStore, fs::FsBlobStore, http::HttpBlobStore},
    sql::base::adapter::SqlAdapter,
};
use engine_config::settings::{BlobBackend, MigrationConfig};
use engine_core::{
    jobs::{CHUNK_JOB_NAME, JobScheduler},
    metrics::Metrics,
    progress::ProgressService,
    retry::RetryPolicy,
    state::{StateStore, sled_store::SledStateStore},
};
use engine_processing::{
    host::HostLayout,
    media::{
        library::{MediaLibrary, SqlMediaLibrary},
        urls::UrlMapper,
    },
    rewrite::table::TableRewriter,
    scan::SchemaScanner,
    worker::{ChunkWorker, WorkerContext},
};
use model::{
    media::MediaId,
    migration::{Progress, Strategy},
    schema::ScanResult,
};
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tracing::{debug, info};

/// Scheduler handler running chunk jobs.
pub struct ChunkJob {
    worker: ChunkWorker,
}

impl ChunkJob {
    pub fn new(worker: ChunkWorker) -> Self {
        ChunkJob { worker }
    }
}

#[async_trait]
impl JobHandler for ChunkJob {
    async fn run(&self, payload: serde_json::Value) -> JobResult {
        let report = self.worker.handle(payload).await?;
        debug!(chunk = report.index, succeeded = report.succeeded, failed = report.failed, "Chunk job done");
        Ok(())
    }
}

/// All components of one process, wired from configuration.
pub struct Engine {
    db: Arc<dyn SqlAdapter>,
    layout: HostLayout,
    urls: UrlMapper,
    default_patterns: Vec<String>,
    state: Arc<dyn StateStore>,
    library: Arc<dyn MediaLibrary>,
    scheduler: Arc<LocalJobScheduler>,
    coordinator: MigrationCoordinator,
    progress: ProgressService,
    metrics: Metrics,
}

impl Engine {
    pub async fn connect(config: &MigrationConfig) -> Result<Self, MigrationError> {
        let db = Adapter::sql(config.database.kind.clone(), &config.database.url)
            .await?
            .into_shared();
        Self::build(config, db).await
    }

    /// Wires the engine around an existing database capability.
    pub async fn build(
        config: &MigrationConfig,
        db: Arc<dyn SqlAdapter>,
    ) -> Result<Self, MigrationError> {
        let state: Arc<dyn StateStore> = Arc::new(SledStateStore::open(&config.run.state_path)?);
        let layout = HostLayout::new(config.database.table_prefix.clone());
        let urls = UrlMapper::new(
            &config.media.local_base_url,
            &config.blob.public_url,
            &config.blob.key_prefix,
        );
        let blobs = blob_store(config);
        let library: Arc<dyn MediaLibrary> =
            Arc::new(SqlMediaLibrary::new(Arc::clone(&db), layout.clone()));
        let metrics = Metrics::new();

        let worker = ChunkWorker::new(WorkerContext {
            library: Arc::clone(&library),
            blobs,
            rewriter: Arc::new(TableRewriter::new(Arc::clone(&db))),
            state: Arc::clone(&state),
            urls: urls.clone(),
            layout: layout.clone(),
            uploads_dir: config.media.uploads_dir.clone(),
            retry: RetryPolicy::for_uploads(config.run.upload_max_attempts),
            metrics: metrics.clone(),
        });

        let handlers: HashMap<String, Arc<dyn JobHandler>> = HashMap::from([(
            CHUNK_JOB_NAME.to_string(),
            Arc::new(ChunkJob::new(worker)) as Arc<dyn JobHandler>,
        )]);
        let scheduler =
            Arc::new(LocalJobScheduler::start(config.run.worker_concurrency, handlers).await?);

        let coordinator = MigrationCoordinator::new(
            Arc::clone(&library),
            Arc::clone(&state),
            Arc::clone(&scheduler) as Arc<dyn JobScheduler>,
            config.run.chunk_size,
            config.run.chunk_stagger,
        );

        info!(
            database = ?db.kind(),
            state = %config.run.state_path.display(),
            "Engine ready"
        );

        Ok(Engine {
            progress: ProgressService::new(Arc::clone(&state)),
            default_patterns: vec![config.media.local_base_url.clone()],
            db,
            layout,
            urls,
            state,
            library,
            scheduler,
            coordinator,
            metrics,
        })
    }

    pub async fn ping(&self) -> Result<(), MigrationError> {
        self.db.ping().await?;
        Ok(())
    }

    /// Scans non-core tables and persists the result, replacing the previous one.
    /// Without patterns the local uploads URL is searched for.
    pub async fn scan(&self, patterns: Vec<String>) -> Result<ScanResult, MigrationError> {
        let patterns = if patterns.is_empty() {
            self.default_patterns.clone()
        } else {
            patterns
        };
        let result = SchemaScanner::new(Arc::clone(&self.db))
            .scan(&self.layout.core_tables(), &patterns)
            .await?;
        self.state.save_scan_result(&result).await?;
        Ok(result)
    }

    pub async fn last_scan(&self) -> Result<Option<ScanResult>, MigrationError> {
        Ok(self.state.load_scan_result().await?)
    }

    pub async fn start_migration(
        &self,
        selected_tables: BTreeSet<String>,
        strategy: Strategy,
    ) -> Result<usize, MigrationError> {
        self.coordinator
            .start_migration(selected_tables, strategy)
            .await
    }

    /// Waits until every scheduled chunk job has run.
    pub async fn wait_idle(&self) -> Result<(), MigrationError> {
        self.scheduler.wait_idle().await?;
        Ok(())
    }

    pub async fn progress(&self) -> Result<Progress, MigrationError> {
        Ok(self.progress.progress().await?)
    }

    pub async fn resolve_url(&self, id: MediaId) -> Result<String, MigrationError> {
        let item = self
            .library
            .fetch(id)
            .await?
            .ok_or(MigrationError::MediaNotFound(id))?;
        Ok(self.urls.resolve(&item))
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

fn blob_store(config: &MigrationConfig) -> Arc<dyn BlobStore> {
    match &config.blob.backend {
        BlobBackend::Http {
            endpoint,
            bucket,
            token,
        } => Arc::new(HttpBlobStore::new(
            endpoint,
            bucket,
            token.clone(),
            &config.blob.public_url,
        )),
        BlobBackend::Filesystem { dir } => {
            Arc::new(FsBlobStore::new(dir.clone(), &config.blob.public_url))
        }
    }
}
