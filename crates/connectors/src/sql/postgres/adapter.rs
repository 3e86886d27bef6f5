use crate::sql::{
    base::{
        adapter::{DatabaseKind, SqlAdapter},
        dialect::{self, Dialect},
        error::{ConnectorError, DbError},
        row::DbRow,
    },
    postgres::{params::PgParamStore, utils::connect_client},
};
use async_trait::async_trait;
use model::{core::value::Value, records::row::RowData, schema::ColumnInfo};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::Client;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct PgAdapter {
    client: Arc<RwLock<Client>>,
    dialect: dialect::Postgres,
}

const QUERY_LIST_TABLES_SQL: &str = include_str!("sql/list_tables.sql");
const QUERY_TABLE_COLUMNS_SQL: &str = include_str!("sql/table_columns.sql");
const QUERY_PRIMARY_KEY_SQL: &str = include_str!("sql/primary_key.sql");

impl PgAdapter {
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let client = Arc::new(RwLock::new(connect_client(url).await?));
        Ok(PgAdapter {
            client,
            dialect: dialect::Postgres,
        })
    }
}

#[async_trait]
impl SqlAdapter for PgAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Postgres
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn exec(&self, query: &str) -> Result<(), DbError> {
        let client = self.client.read().await;
        client.batch_execute(query).await?;
        Ok(())
    }

    async fn exec_params(&self, query: &str, params: Vec<Value>) -> Result<u64, DbError> {
        debug!(sql = %query, params = params.len(), "Postgres exec");
        let bindings = PgParamStore::from_values(params);
        let client = self.client.read().await;
        let affected = client.execute(query, &bindings.as_refs()).await?;
        Ok(affected)
    }

    async fn query_rows(&self, sql: &str, params: Vec<Value>) -> Result<Vec<RowData>, DbError> {
        debug!(sql = %sql, params = params.len(), "Postgres query");
        let bindings = PgParamStore::from_values(params);
        let client = self.client.read().await;
        let rows = client.query(sql, &bindings.as_refs()).await?;
        Ok(rows
            .iter()
            .map(|row| DbRow::PostgresRow(row).to_row_data(""))
            .collect())
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let rows = self.query_rows(QUERY_LIST_TABLES_SQL, Vec::new()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get_value("table_name").as_string())
            .collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DbError> {
        let rows = self
            .query_rows(QUERY_TABLE_COLUMNS_SQL, vec![Value::from(table)])
            .await?;

        rows.iter()
            .map(|row| {
                let name = row.get_value("column_name").as_string();
                let type_name = row.get_value("column_type").as_string();
                match (name, type_name) {
                    (Some(name), Some(type_name)) => Ok(ColumnInfo::new(name, type_name)),
                    _ => Err(DbError::Unknown(format!(
                        "incomplete column metadata for table '{table}'"
                    ))),
                }
            })
            .collect()
    }

    async fn primary_key(&self, table: &str) -> Result<Option<String>, DbError> {
        let rows = self
            .query_rows(QUERY_PRIMARY_KEY_SQL, vec![Value::from(table)])
            .await?;
        let mut keys: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get_value("column_name").as_string())
            .collect();

        if keys.len() > 1 {
            warn!(table = %table, columns = ?keys, "Composite primary key is not row-addressable");
            return Ok(None);
        }
        Ok(keys.pop())
    }
}
