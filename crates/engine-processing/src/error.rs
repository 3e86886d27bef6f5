use connectors::sql::base::error::DbError;
use engine_core::error::StateStoreError;
use model::media::MediaId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to list tables: {0}")]
    ListTables(#[source] DbError),

    #[error("Schema introspection failed for table '{table}': {source}")]
    SchemaIntrospectionFailed {
        table: String,
        #[source]
        source: DbError,
    },
}

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Schema introspection failed for table '{table}': {source}")]
    SchemaIntrospectionFailed {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("Table '{table}' has no single-column primary key")]
    NoPrimaryKey { table: String },

    #[error("Rewrite of table '{table}' failed: {source}")]
    Database {
        table: String,
        #[source]
        source: DbError,
    },
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Media library query failed: {0}")]
    Database(#[from] DbError),

    #[error("Malformed metadata for media item {id}: {reason}")]
    Malformed { id: MediaId, reason: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("No migration has been started")]
    NoMigration,

    #[error("Chunk belongs to run {chunk_run}, current run is {current_run}")]
    StaleRun {
        chunk_run: String,
        current_run: String,
    },

    #[error("State store error: {0}")]
    State(#[from] StateStoreError),

    #[error("Invalid chunk payload: {0}")]
    Payload(#[from] serde_json::Error),
}
