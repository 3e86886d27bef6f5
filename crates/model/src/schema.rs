use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type-name fragments that mark a column as able to hold a reference path.
/// Matched case-insensitively as substrings so custom column types are not missed.
pub const TEXT_LIKE_TYPES: [&str; 5] = ["text", "char", "blob", "binary", "varchar"];

pub fn is_text_like(type_name: &str) -> bool {
    let lowered = type_name.to_ascii_lowercase();
    TEXT_LIKE_TYPES.iter().any(|t| lowered.contains(t))
}

/// Column as reported by the store's introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        ColumnInfo {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub text_like: bool,
}

/// Shape of one table discovered at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnSchema>,
    /// `None` means rows cannot be addressed individually.
    pub primary_key: Option<String>,
}

impl TableSchema {
    pub fn from_columns(table: &str, columns: &[ColumnInfo], primary_key: Option<String>) -> Self {
        TableSchema {
            table: table.to_string(),
            columns: columns
                .iter()
                .map(|c| ColumnSchema {
                    name: c.name.clone(),
                    text_like: is_text_like(&c.type_name),
                })
                .collect(),
            primary_key,
        }
    }

    pub fn text_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.text_like)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn has_text_columns(&self) -> bool {
        self.columns.iter().any(|c| c.text_like)
    }
}

/// Table name to number of rows referencing a scan pattern.
/// Each scan produces a fresh result that replaces the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub tables: BTreeMap<String, u64>,
    pub scanned_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ScanResult {
    pub fn new(tables: BTreeMap<String, u64>) -> Self {
        ScanResult {
            tables,
            scanned_at: Some(chrono::Utc::now()),
        }
    }

    pub fn count(&self, table: &str) -> Option<u64> {
        self.tables.get(table).copied()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_text_like_types() {
        for ty in [
            "longtext",
            "VARCHAR(255)",
            "character varying",
            "mediumblob",
            "varbinary(16)",
            "TinyText",
        ] {
            assert!(is_text_like(ty), "{ty} should be text-like");
        }

        for ty in ["bigint(20) unsigned", "datetime", "integer", "json", "bytea"] {
            assert!(!is_text_like(ty), "{ty} should not be text-like");
        }
    }

    #[test]
    fn schema_keeps_column_order() {
        let cols = vec![
            ColumnInfo::new("id", "bigint"),
            ColumnInfo::new("body", "longtext"),
            ColumnInfo::new("created", "datetime"),
            ColumnInfo::new("title", "varchar(200)"),
        ];
        let schema = TableSchema::from_columns("t", &cols, Some("id".into()));
        assert_eq!(schema.text_columns(), vec!["body", "title"]);
        assert!(schema.has_text_columns());
        assert_eq!(schema.columns[2].name, "created");
    }
}
