use crate::sql::{
    base::{
        adapter::{DatabaseKind, SqlAdapter},
        dialect::{self, Dialect},
        error::{ConnectorError, DbError},
        row::DbRow,
    },
    mysql::params::MySqlParamStore,
};
use async_trait::async_trait;
use model::{core::value::Value, records::row::RowData, schema::ColumnInfo};
use mysql_async::{Opts, Pool, Row, prelude::Queryable};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct MySqlAdapter {
    pool: Pool,
    dialect: dialect::MySql,
}

const QUERY_LIST_TABLES_SQL: &str = include_str!("sql/list_tables.sql");
const QUERY_TABLE_COLUMNS_SQL: &str = include_str!("sql/table_columns.sql");
const QUERY_PRIMARY_KEY_SQL: &str = include_str!("sql/primary_key.sql");

impl MySqlAdapter {
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let opts = Opts::from_url(url).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
        let pool = Pool::new(opts);

        // Fail fast on unreachable servers instead of on the first query.
        let conn = pool.get_conn().await?;
        drop(conn);

        Ok(MySqlAdapter {
            pool,
            dialect: dialect::MySql,
        })
    }

    pub async fn disconnect(self) -> Result<(), DbError> {
        self.pool.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl SqlAdapter for MySqlAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySql
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn exec(&self, query: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(query).await?;
        Ok(())
    }

    async fn exec_params(&self, query: &str, params: Vec<Value>) -> Result<u64, DbError> {
        debug!(sql = %query, params = params.len(), "MySQL exec");
        let bindings = MySqlParamStore::from_values(&params);
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(query, bindings.params()).await?;
        Ok(conn.affected_rows())
    }

    async fn query_rows(&self, sql: &str, params: Vec<Value>) -> Result<Vec<RowData>, DbError> {
        debug!(sql = %sql, params = params.len(), "MySQL query");
        let bindings = MySqlParamStore::from_values(&params);
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<Row> = conn.exec(sql, bindings.params()).await?;
        Ok(rows
            .iter()
            .map(|row| DbRow::MySqlRow(row).to_row_data(""))
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
