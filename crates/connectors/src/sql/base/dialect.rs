//! Defines the `Dialect` trait for database-specific SQL syntax.

use model::core::value::Value;

pub trait Dialect: Send + Sync {
    /// Wraps an identifier (like a table or column name) in the correct
    /// quotation marks for the dialect.
    ///
    /// - PostgreSQL uses double quotes: `"my_column"`
    /// - MySQL uses backticks: `` `my_column` ``
    fn quote_identifier(&self, ident: &str) -> String;

    /// Returns the placeholder for a parameterized query.
    ///
    /// - PostgreSQL uses `$1`, `$2`, etc.
    /// - MySQL uses `?`
    fn get_placeholder(&self, index: usize) -> String;

    /// Returns the name of the dialect (e.g., "PostgreSQL", "MySQL").
    fn name(&self) -> String;

    /// Expression used to compare a primary-key column against a bound key.
    fn key_expr(&self, quoted_column: &str) -> String {
        quoted_column.to_string()
    }

    /// Converts a key value read back from the store into the bind parameter
    /// matching [`Dialect::key_expr`].
    fn key_param(&self, key: &Value) -> Value {
        key.clone()
    }

    /// Expression used to apply `LIKE` to a text-like column.
    fn like_expr(&self, quoted_column: &str) -> String {
        quoted_column.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{}""#, ident.replace('"', "\"\""))
    }

    fn get_placeholder(&self, index: usize) -> String {
        // PostgreSQL uses $1, $2, etc.
        format!("${}", index + 1)
    }

    fn name(&self) -> String {
        "PostgreSQL".into()
    }

    // Keys are compared as text so integer, uuid and text keys bind the same way.
    fn key_expr(&self, quoted_column: &str) -> String {
        format!("CAST({quoted_column} AS TEXT)")
    }

    fn key_param(&self, key: &Value) -> Value {
        match key.as_string() {
            Some(s) => Value::String(s),
            None => Value::Null,
        }
    }

    fn like_expr(&self, quoted_column: &str) -> String {
        format!("CAST({quoted_column} AS TEXT)")
    }
}

#[derive(Debug, Clone)]
pub struct MySql;

impl Dialect for MySql {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#"`{}`"#, ident.replace('`', "``"))
    }

    fn get_placeholder(&self, _index: usize) -> String {
        // MySQL uses ?
        "?".into()
    }

    fn name(&self) -> String {
        "MySQL".into()
    }
}

/// Escapes `LIKE` wildcards so `pattern` is matched literally anywhere in the value.
/// Both MySQL and PostgreSQL use `\` as the default escape character.
pub fn contains_pattern(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len() + 2);
    escaped.push('%');
    for ch in pattern.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers_per_dialect() {
        assert_eq!(MySql.quote_identifier("wp_posts"), "`wp_posts`");
        assert_eq!(MySql.quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(Postgres.quote_identifier("Posts"), r#""Posts""#);
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(
            contains_pattern("http://x/100%_a\\b"),
            "%http://x/100\\%\\_a\\\\b%"
        );
    }

    #[test]
    fn postgres_binds_keys_as_text() {
        assert_eq!(Postgres.key_param(&Value::Int(12)), Value::from("12"));
        assert_eq!(MySql.key_param(&Value::Int(12)), Value::Int(12));
    }
}
