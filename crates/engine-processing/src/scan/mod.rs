use crate::error::ScanError;
use connectors::sql::base::{adapter::SqlAdapter, error::DbError};
use model::schema::{ScanResult, TableSchema};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Finds tables whose text-like columns reference any of a set of patterns.
#[derive(Clone)]
pub struct SchemaScanner {
    db: Arc<dyn SqlAdapter>,
}

impl SchemaScanner {
    pub fn new(db: Arc<dyn SqlAdapter>) -> Self {
        SchemaScanner { db }
    }

    /// Columns, their text-likeness and the row key of one table.
    pub async fn describe(&self, table: &str) -> Result<TableSchema, ScanError> {
        let introspection_failed = |source: DbError| ScanError::SchemaIntrospectionFailed {
            table: table.to_string(),
            source,
        };

        let columns = self
            .db
            .table_columns(table)
            .await
            .map_err(introspection_failed)?;
        let primary_key = self
            .db
            .primary_key(table)
            .await
            .map_err(introspection_failed)?;

        Ok(TableSchema::from_columns(table, &columns, primary_key))
    }

    /// Counts matching rows per table. Tables in `exclude`, tables without
    /// text-like columns and tables that cannot be introspected are left out,
    /// as are tables with no match.
    pub async fn scan(
        &self,
        exclude: &BTreeSet<String>,
        patterns: &[String],
    ) -> Result<ScanResult, ScanError> {
        let tables = self.db.list_tables().await.map_err(ScanError::ListTables)?;
        let mut counts = BTreeMap::new();

        if patterns.is_empty() {
            warn!("Scan requested without patterns");
            return Ok(ScanResult::new(counts));
        }

        for table in tables.iter().filter(|t| !exclude.contains(*t)) {
            let schema = match self.describe(table).await {
                Ok(schema) => schema,
                Err(err) => {
                    warn!(table = %table, error = %err, "Skipping table");
                    continue;
                }
            };

            let columns = schema.text_columns();
            if columns.is_empty() {
                debug!(table = %table, "No text-like columns");
                continue;
            }

            match self.db.count_matching(table, &columns, patterns).await {
                Ok(0) => {}
                Ok(count) => {
                    counts.insert(table.clone(), count);
                }
                Err(err) => warn!(table = %table, error = %err, "Row count failed, skipping table"),
            }
        }

        info!(
            tables = tables.len(),
            matching = counts.len(),
            "Schema scan finished"
        );
        Ok(ScanResult::new(counts))
    }
}
