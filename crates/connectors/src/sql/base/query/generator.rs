use crate::sql::base::{
    dialect::{Dialect, contains_pattern},
    error::DbError,
};
use model::core::value::Value;

/// Alias of the aggregate column returned by [`QueryGenerator::count_matching`].
pub const COUNT_ALIAS: &str = "match_count";

/// Builds the parameterized statements the rewrite engine issues.
pub struct QueryGenerator<'a> {
    dialect: &'a dyn Dialect,
}

struct Params<'a> {
    dialect: &'a dyn Dialect,
    values: Vec<Value>,
}

impl<'a> Params<'a> {
    fn new(dialect: &'a dyn Dialect) -> Self {
        Params {
            dialect,
            values: Vec::new(),
        }
    }

    /// Registers a value and returns its placeholder.
    fn push(&mut self, value: Value) -> String {
        let placeholder = self.dialect.get_placeholder(self.values.len());
        self.values.push(value);
        placeholder
    }
}

impl<'a> QueryGenerator<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    fn ident(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    fn like_any(&self, params: &mut Params<'_>, columns: &[String], patterns: &[String]) -> String {
        let mut clauses = Vec::with_capacity(columns.len() * patterns.len());
        for column in columns {
            let expr = self.dialect.like_expr(&self.ident(column));
            for pattern in patterns {
                let placeholder = params.push(Value::String(contains_pattern(pattern)));
                clauses.push(format!("{expr} LIKE {placeholder}"));
            }
        }
        clauses.join(" OR ")
    }

    /// `SELECT COUNT(*)` of rows where any column contains any pattern.
    pub fn count_matching(
        &self,
        table: &str,
        columns: &[String],
        patterns: &[String],
    ) -> Result<(String, Vec<Value>), DbError> {
        if columns.is_empty() || patterns.is_empty() {
            return Err(DbError::QueryBuild(format!(
                "count on '{table}' needs at least one column and one pattern"
            )));
        }

        let mut params = Params::new(self.dialect);
        let predicate = self.like_any(&mut params, columns, patterns);
        let sql = format!(
            "SELECT COUNT(*) AS {COUNT_ALIAS} FROM {} WHERE {predicate}",
            self.ident(table)
        );
        Ok((sql, params.values))
    }

    /// Primary keys of the rows where any of `columns` contains `pattern`.
    pub fn matching_keys(
        &self,
        table: &str,
        key_column: &str,
        columns: &[String],
        pattern: &str,
    ) -> Result<(String, Vec<Value>), DbError> {
        if columns.is_empty() {
            return Err(DbError::QueryBuild(format!(
                "key scan on '{table}' needs at least one column"
            )));
        }

        let mut params = Params::new(self.dialect);
        let predicate = self.like_any(&mut params, columns, &[pattern.to_string()]);
        let key = self.ident(key_column);
        let sql = format!(
            "SELECT {key} FROM {} WHERE {predicate} ORDER BY {key}",
            self.ident(table)
        );
        Ok((sql, params.values))
    }

    pub fn select_row(&self, table: &str, key_column: &str, key: &Value) -> (String, Vec<Value>) {
        let mut params = Params::new(self.dialect);
        let placeholder = params.push(self.dialect.key_param(key));
        let sql = format!(
            "SELECT * FROM {} WHERE {} = {placeholder}",
            self.ident(table),
            self.dialect.key_expr(&self.ident(key_column))
        );
        (sql, params.values)
    }

    pub fn update_row(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
        changes: &[(String, Value)],
    ) -> Result<(String, Vec<Value>), DbError> {
        if changes.is_empty() {
            return Err(DbError::QueryBuild(format!(
                "update on '{table}' has no columns to set"
            )));
        }

        let mut params = Params::new(self.dialect);
        let assignments = changes
            .iter()
            .map(|(column, value)| {
                let placeholder = params.push(value.clone());
                format!("{} = {placeholder}", self.ident(column))
            })
            .collect::<Vec<_>>()
            .join(", ");
        let key_placeholder = params.push(self.dialect.key_param(key));

        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {} = {key_placeholder}",
            self.ident(table),
            self.dialect.key_expr(&self.ident(key_column))
        );
        Ok((sql, params.values))
    }

    /// Bulk substring replace over one column; rows without a match are not touched.
    pub fn replace_in_column(
        &self,
        table: &str,
        column: &str,
        old: &str,
        new: &str,
    ) -> (String, Vec<Value>) {
        let mut params = Params::new(self.dialect);
        let col = self.ident(column);
        let old_placeholder = params.push(Value::from(old));
        let new_placeholder = params.push(Value::from(new));
        let like = params.push(Value::String(contains_pattern(old)));

        let sql = format!(
            "UPDATE {} SET {col} = REPLACE({col}, {old_placeholder}, {new_placeholder}) WHERE {} LIKE {like}",
            self.ident(table),
            self.dialect.like_expr(&col)
        );
        (sql, params.values)
    }
}
