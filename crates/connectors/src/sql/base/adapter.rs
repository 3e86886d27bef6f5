use crate::sql::base::{
    dialect::Dialect,
    error::DbError,
    query::generator::{COUNT_ALIAS, QueryGenerator},
};
use async_trait::async_trait;
use model::{core::value::Value, records::row::RowData, schema::ColumnInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseKind {
    MySql,
    Postgres,
    Other(String),
}

impl DatabaseKind {
    /// Infers the kind from a connection URL scheme.
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split("://").next().unwrap_or_default();
        Self::from_name(scheme)
    }

    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => DatabaseKind::MySql,
            "pg" | "postgres" | "postgresql" => DatabaseKind::Postgres,
            other => DatabaseKind::Other(other.to_string()),
        }
    }
}

/// Relational store capability used by the scanner, the rewriters and the media library.
///
/// Drivers implement the primitives (`exec_params`, `query_rows`, introspection);
/// the row-level operations are derived from them through [`QueryGenerator`].
#[async_trait]
pub trait SqlAdapter: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    fn dialect(&self) -> &dyn Dialect;

    // Exec / Params
    async fn exec(&self, query: &str) -> Result<(), DbError>;

    /// Executes a statement and returns the number of affected rows.
    async fn exec_params(&self, query: &str, params: Vec<Value>) -> Result<u64, DbError>;

    async fn query_rows(&self, sql: &str, params: Vec<Value>) -> Result<Vec<RowData>, DbError>;

    // Introspection
    async fn list_tables(&self) -> Result<Vec<String>, DbError>;

    /// Columns in declaration order with their declared type names.
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DbError>;

    /// Single-column primary key, `None` when absent or composite.
    async fn primary_key(&self, table: &str) -> Result<Option<String>, DbError>;

    async fn ping(&self) -> Result<(), DbError> {
        self.query_rows("SELECT 1", Vec::new()).await.map(|_| ())
    }

    async fn count_matching(
        &self,
        table: &str,
        columns: &[String],
        patterns: &[String],
    ) -> Result<u64, DbError> {
        let (sql, params) =
            QueryGenerator::new(self.dialect()).count_matching(table, columns, patterns)?;
        let rows = self.query_rows(&sql, params).await?;
        let count = rows
            .first()
            .map(|row| row.get_value(COUNT_ALIAS))
            .and_then(|value| value.as_u64())
            .unwrap_or(0);
        Ok(count)
    }

    async fn matching_keys(
        &self,
        table: &str,
        key_column: &str,
        columns: &[String],
        pattern: &str,
    ) -> Result<Vec<Value>, DbError> {
        let (sql, params) =
            QueryGenerator::new(self.dialect()).matching_keys(table, key_column, columns, pattern)?;
        let rows = self.query_rows(&sql, params).await?;
        Ok(rows.iter().map(RowData::first_value).collect())
    }

    async fn fetch_row(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
    ) -> Result<Option<RowData>, DbError> {
        let (sql, params) = QueryGenerator::new(self.dialect()).select_row(table, key_column, key);
        let mut rows = self.query_rows(&sql, params).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn update_row(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
        changes: &[(String, Value)],
    ) -> Result<u64, DbError> {
        let (sql, params) =
            QueryGenerator::new(self.dialect()).update_row(table, key_column, key, changes)?;
        self.exec_params(&sql, params).await
    }

    async fn replace_in_column(
        &self,
        table: &str,
        column: &str,
        old: &str,
        new: &str,
    ) -> Result<u64, DbError> {
        let (sql, params) =
            QueryGenerator::new(self.dialect()).replace_in_column(table, column, old, new);
        self.exec_params(&sql, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_kind_from_url() {
        assert_eq!(
            DatabaseKind::from_url("mysql://u:p@localhost/wp"),
            DatabaseKind::MySql
        );
        assert_eq!(
            DatabaseKind::from_url("postgresql://localhost/wp"),
            DatabaseKind::Postgres
        );
        assert_eq!(
            DatabaseKind::from_url("sqlite://wp.db"),
            DatabaseKind::Other("sqlite".into())
        );
    }
}
