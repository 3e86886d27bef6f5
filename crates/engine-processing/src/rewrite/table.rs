use crate::{
    error::{RewriteError, ScanError},
    rewrite::value::ValueRewriter,
    scan::SchemaScanner,
};
use connectors::sql::base::{adapter::SqlAdapter, error::DbError};
use model::{
    core::value::Value,
    migration::Strategy,
    rewrite::{RewriteJob, RewriteStats},
    schema::TableSchema,
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Applies a [`RewriteJob`] to whole tables.
pub struct TableRewriter {
    db: Arc<dyn SqlAdapter>,
    scanner: SchemaScanner,
    schemas: RwLock<HashMap<String, Arc<TableSchema>>>,
}

impl TableRewriter {
    pub fn new(db: Arc<dyn SqlAdapter>) -> Self {
        TableRewriter {
            scanner: SchemaScanner::new(Arc::clone(&db)),
            db,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Table shape, introspected once per rewriter.
    pub async fn schema(&self, table: &str) -> Result<Arc<TableSchema>, RewriteError> {
        if let Some(schema) = self.schemas.read().await.get(table) {
            return Ok(Arc::clone(schema));
        }

        let schema = self
            .scanner
            .describe(table)
            .await
            .map_err(|err| match err {
                ScanError::SchemaIntrospectionFailed { table, source } => {
                    RewriteError::SchemaIntrospectionFailed { table, source }
                }
                ScanError::ListTables(source) => RewriteError::Database {
                    table: table.to_string(),
                    source,
                },
            })?;

        let schema = Arc::new(schema);
        self.schemas
            .write()
            .await
            .insert(table.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Rewrites every listed table, logging and skipping the ones that fail.
    pub async fn rewrite_tables<'a, I>(
        &self,
        tables: I,
        job: &RewriteJob,
        strategy: Strategy,
    ) -> RewriteStats
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut total = RewriteStats::default();
        for table in tables {
            match self.rewrite_table(table, job, strategy).await {
                Ok(stats) => total += stats,
                Err(err) => {
                    warn!(table = %table, error = %err, "Table rewrite failed");
                    total.tables_failed += 1;
                }
            }
        }
        total
    }

    pub async fn rewrite_table(
        &self,
        table: &str,
        job: &RewriteJob,
        strategy: Strategy,
    ) -> Result<RewriteStats, RewriteError> {
        if job.is_noop() {
            return Ok(RewriteStats::default());
        }

        let schema = self.schema(table).await?;
        if !schema.has_text_columns() {
            debug!(table = %table, "No text-like columns to rewrite");
            return Ok(RewriteStats::default());
        }

        let stats = match strategy {
            Strategy::Naive => self.rewrite_naive(&schema, job).await,
            Strategy::Advanced => match Self::row_key(&schema) {
                Ok(key) => self.rewrite_advanced(&schema, key, job).await?,
                Err(err) => {
                    warn!(error = %err, "Falling back to naive rewrite");
                    self.rewrite_naive(&schema, job).await
                }
            },
        };

        if stats.rows_updated > 0 || stats.rows_failed > 0 {
            info!(
                table = %table,
                strategy = %strategy,
                updated = stats.rows_updated,
                failed = stats.rows_failed,
                "Rewrote table"
            );
        }
        Ok(stats)
    }

    fn row_key(schema: &TableSchema) -> Result<&str, RewriteError> {
        schema
            .primary_key
            .as_deref()
            .ok_or_else(|| RewriteError::NoPrimaryKey {
                table: schema.table.clone(),
            })
    }

    /// One in-database replace per text-like column.
    async fn rewrite_naive(&self, schema: &TableSchema, job: &RewriteJob) -> RewriteStats {
        let mut stats = RewriteStats::default();
        for column in schema.text_columns() {
            match self
                .db
                .replace_in_column(&schema.table, &column, &job.old, &job.new)
                .await
            {
                Ok(affected) => stats.rows_updated += affected,
                Err(err) => {
                    warn!(table = %schema.table, column = %column, error = %err, "Column replace failed");
                    stats.rows_failed += 1;
                }
            }
        }
        stats
    }

    /// Row by row through the value rewriter; only rows whose raw text
    /// contains `old` are fetched, and only changed columns are written.
    async fn rewrite_advanced(
        &self,
        schema: &TableSchema,
        key_column: &str,
        job: &RewriteJob,
    ) -> Result<RewriteStats, RewriteError> {
        let columns = schema.text_columns();
        let keys = self
            .db
            .matching_keys(&schema.table, key_column, &columns, &job.old)
            .await
            .map_err(|source| RewriteError::Database {
                table: schema.table.clone(),
                source,
            })?;

        let rewriter = ValueRewriter::for_job(job);
        let mut stats = RewriteStats::default();

        for key in keys {
            match self
                .rewrite_row(schema, key_column, &key, &columns, &rewriter, job)
                .await
            {
                Ok(true) => stats.rows_updated += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(table = %schema.table, key = %key, error = %err, "Row rewrite failed");
                    stats.rows_failed += 1;
                }
            }
        }
        Ok(stats)
    }

    async fn rewrite_row(
        &self,
        schema: &TableSchema,
        key_column: &str,
        key: &Value,
        columns: &[String],
        rewriter: &ValueRewriter<'_>,
        job: &RewriteJob,
    ) -> Result<bool, RewriteError> {
        let database = |source: DbError| RewriteError::Database {
            table: schema.table.clone(),
            source,
        };

        let Some(row) = self
            .db
            .fetch_row(&schema.table, key_column, key)
            .await
            .map_err(database)?
        else {
            return Ok(false);
        };

        let changes: Vec<(String, Value)> = columns
            .iter()
            .filter_map(|column| {
                let raw = row.get_value(column);
                let raw = raw.as_str()?;
                if !raw.contains(job.old.as_str()) {
                    return None;
                }
                let rewritten = rewriter.rewrite(raw);
                (rewritten != raw).then(|| (column.clone(), Value::String(rewritten)))
            })
            .collect();

        if changes.is_empty() {
            return Ok(false);
        }

        self.db
            .update_row(&schema.table, key_column, key, &changes)
            .await
            .map_err(database)?;
        Ok(true)
    }
}
