#![allow(dead_code)]

use crate::fakes::{MemoryBlobStore, MemoryDb, MemoryLibrary};
use engine_core::{
    metrics::Metrics,
    retry::RetryPolicy,
    state::{StateStore, sled_store::SledStateStore},
};
use engine_processing::{
    host::HostLayout,
    media::urls::UrlMapper,
    rewrite::table::TableRewriter,
    worker::{ChunkWorker, WorkerContext},
};
use model::{
    core::value::Value,
    media::{AttachmentMeta, MediaId, MediaItem, SizeVariant},
    migration::{MigrationState, Strategy},
};
use std::{collections::BTreeSet, sync::Arc, time::Duration};
use tempfile::TempDir;

pub mod fakes;
pub mod integration;

pub const TABLE_PREFIX: &str = "wp_";
pub const LOCAL_BASE_URL: &str = "http://old";
pub const PUBLIC_URL: &str = "https://cdn.example.com";
pub const BUCKET: &str = "media";

/// Host tables with the columns the rewrite touches.
pub fn host_db() -> MemoryDb {
    let db = MemoryDb::new();
    db.create_table(
        "wp_posts",
        &[
            ("ID", "bigint unsigned"),
            ("post_content", "longtext"),
            ("guid", "varchar(255)"),
            ("post_type", "varchar(20)"),
        ],
        Some("ID"),
    );
    db.create_table(
        "wp_postmeta",
        &[
            ("meta_id", "bigint unsigned"),
            ("post_id", "bigint unsigned"),
            ("meta_key", "varchar(255)"),
            ("meta_value", "longtext"),
        ],
        Some("meta_id"),
    );
    db
}

pub fn item(id: u64, file: &str, sizes: &[&str]) -> MediaItem {
    MediaItem {
        id: MediaId(id),
        relative_path: file.to_string(),
        mime: None,
        meta: AttachmentMeta {
            file: file.to_string(),
            sizes: sizes
                .iter()
                .enumerate()
                .map(|(i, s)| SizeVariant {
                    name: format!("size{i}"),
                    file: s.to_string(),
                    mime: None,
                })
                .collect(),
            remote: None,
        },
    }
}

/// A worker wired to in-memory capabilities and a scratch uploads directory.
pub struct Harness {
    pub db: Arc<MemoryDb>,
    pub blobs: Arc<MemoryBlobStore>,
    pub library: Arc<MemoryLibrary>,
    pub state: Arc<dyn StateStore>,
    pub metrics: Metrics,
    pub urls: UrlMapper,
    pub layout: HostLayout,
    pub uploads: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Harness {
            db: Arc::new(host_db()),
            blobs: Arc::new(MemoryBlobStore::new(BUCKET, PUBLIC_URL)),
            library: Arc::new(MemoryLibrary::new()),
            state: Arc::new(SledStateStore::temporary().expect("temporary store")),
            metrics: Metrics::new(),
            urls: UrlMapper::new(LOCAL_BASE_URL, PUBLIC_URL, ""),
            layout: HostLayout::new(TABLE_PREFIX),
            uploads: tempfile::tempdir().expect("uploads dir"),
        }
    }

    /// Writes the item's files under the uploads directory and adds it to the library.
    pub fn add_item(&self, item: MediaItem) {
        for relative in item.meta.relative_paths() {
            let path = self.uploads.path().join(&relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("create dirs");
            }
            std::fs::write(&path, relative.as_bytes()).expect("write upload");
        }
        self.library.add(item);
    }

    pub fn worker(&self) -> ChunkWorker {
        ChunkWorker::new(WorkerContext {
            library: self.library.clone(),
            blobs: self.blobs.clone(),
            rewriter: Arc::new(TableRewriter::new(self.db.clone())),
            state: Arc::clone(&self.state),
            urls: self.urls.clone(),
            layout: self.layout.clone(),
            uploads_dir: self.uploads.path().to_path_buf(),
            retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
            metrics: self.metrics.clone(),
        })
    }

    /// Stores a fresh run covering `total` items.
    pub async fn start_run(&self, total: u64, tables: &[&str], strategy: Strategy) -> MigrationState {
        let selected: BTreeSet<String> = tables.iter().map(|t| t.to_string()).collect();
        let state = MigrationState::start(total, selected, strategy);
        self.state.save_state(&state).await.expect("save state");
        state
    }

    pub fn post(&self, id: i64, content: &str) {
        self.db.insert(
            "wp_posts",
            &[
                ("ID", Value::Int(id)),
                ("post_content", Value::from(content)),
                ("guid", Value::from(format!("http://site/?p={id}"))),
                ("post_type", Value::from("post")),
            ],
        );
    }

    pub fn meta(&self, meta_id: i64, post_id: i64, key: &str, value: &str) {
        self.db.insert(
            "wp_postmeta",
            &[
                ("meta_id", Value::Int(meta_id)),
                ("post_id", Value::Int(post_id)),
                ("meta_key", Value::from(key)),
                ("meta_value", Value::from(value)),
            ],
        );
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
