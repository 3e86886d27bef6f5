use core::fmt;
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use mysql_async::{Row as MySqlRow, Value as MySqlValue};
use std::fmt::Formatter;
use tokio_postgres::{Row as PgRow, types::Type};
use tracing::warn;

pub enum DbRow<'a> {
    MySqlRow(&'a MySqlRow),
    PostgresRow(&'a PgRow),
}

impl DbRow<'_> {
    pub fn to_row_data(&self, table: &str) -> RowData {
        let columns = self
            .columns()
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let value = self.get_value(idx);
                FieldValue::new(name, value)
            })
            .collect();

        RowData::new(table, columns)
    }

    pub fn columns(&self) -> Vec<String> {
        match self {
            DbRow::MySqlRow(row) => row
                .columns_ref()
                .iter()
                .map(|col| col.name_str().into_owned())
                .collect(),
            DbRow::PostgresRow(row) => row
                .columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect(),
        }
    }

    pub fn get_value(&self, idx: usize) -> Option<Value> {
        match self {
            DbRow::MySqlRow(row) => row.as_ref(idx).map(mysql_value),
            DbRow::PostgresRow(row) => pg_value(row, idx),
        }
    }
}

fn mysql_value(value: &MySqlValue) -> Value {
    match value {
        MySqlValue::NULL => Value::Null,
        // Text and blob columns arrive as bytes; keep them textual when they are valid UTF-8.
        MySqlValue::Bytes(bytes) => match String::from_utf8(bytes.clone()) {
            Ok(text) => Value::String(text),
            Err(_) => Value::Bytes(bytes.clone()),
        },
        MySqlValue::Int(i) => Value::Int(*i),
        MySqlValue::UInt(u) => Value::Uint(*u),
        MySqlValue::Float(f) => Value::Float(f64::from(*f)),
        MySqlValue::Double(d) => Value::Float(*d),
        MySqlValue::Date(y, m, d, h, mi, s, us) => Value::String(format!(
            "{y:04}-{m:02}-{d:02} {h:02}:{mi:02}:{s:02}.{us:06}"
        )),
        MySqlValue::Time(neg, days, h, mi, s, us) => Value::String(format!(
            "{}{}:{mi:02}:{s:02}.{us:06}",
            if *neg { "-" } else { "" },
            u32::from(*h) + days * 24
        )),
    }
}

fn pg_value(row: &PgRow, idx: usize) -> Option<Value> {
    let column = row.columns().get(idx)?;
    let ty = column.type_();

    let value = if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .map(|v| v.map(|v| Value::Int(i64::from(v))))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .map(|v| v.map(|v| Value::Int(i64::from(v))))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx).map(|v| v.map(Value::Int))
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .map(|v| v.map(|v| Value::Float(f64::from(v))))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx).map(|v| v.map(Value::Float))
    } else if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx).map(|v| v.map(Value::Boolean))
    } else if *ty == Type::BYTEA {
        row.try_get::<_, Option<Vec<u8>>>(idx).map(|v| v.map(Value::Bytes))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .map(|v| v.map(Value::Timestamp))
    } else {
        row.try_get::<_, Option<String>>(idx).map(|v| v.map(Value::String))
    };

    match value {
        Ok(Some(v)) => Some(v),
        Ok(None) => Some(Value::Null),
        Err(err) => {
            warn!(column = %column.name(), pg_type = %ty.name(), %err, "Unreadable column value");
            None
        }
    }
}

impl fmt::Debug for DbRow<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DbRow::MySqlRow(row) => write!(f, "{row:?}"),
            DbRow::PostgresRow(row) => write!(f, "{row:?}"),
        }
    }
}
