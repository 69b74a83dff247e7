//! Row-to-JSON conversion for tool responses.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value, json};
use tokio_postgres::Row;
use tokio_postgres::types::Type;
use uuid::Uuid;

/// Convert one row into a JSON object keyed by column name. Unsupported
/// types degrade to a tagged string rather than failing the request.
pub fn row_to_json(row: &Row) -> Value {
    let mut object = serde_json::Map::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), cell_to_json(row, i));
    }
    Value::Object(object)
}

fn cell_to_json(row: &Row, i: usize) -> Value {
    let column_type = row.columns()[i].type_();

    if *column_type == Type::BOOL {
        opt(row.try_get::<_, Option<bool>>(i))
    } else if *column_type == Type::INT2 {
        opt(row.try_get::<_, Option<i16>>(i))
    } else if *column_type == Type::INT4 {
        opt(row.try_get::<_, Option<i32>>(i))
    } else if *column_type == Type::INT8 {
        opt(row.try_get::<_, Option<i64>>(i))
    } else if *column_type == Type::FLOAT4 {
        opt(row.try_get::<_, Option<f32>>(i))
    } else if *column_type == Type::FLOAT8 {
        opt(row.try_get::<_, Option<f64>>(i))
    } else if *column_type == Type::NUMERIC {
        match row.try_get::<_, Option<Decimal>>(i) {
            Ok(Some(decimal)) => decimal
                .to_f64()
                .map(|f| json!(f))
                .unwrap_or_else(|| Value::String(decimal.to_string())),
            _ => Value::Null,
        }
    } else if *column_type == Type::TEXT
        || *column_type == Type::VARCHAR
        || *column_type == Type::BPCHAR
        || *column_type == Type::NAME
    {
        opt(row.try_get::<_, Option<String>>(i))
    } else if *column_type == Type::JSON || *column_type == Type::JSONB {
        match row.try_get::<_, Option<Value>>(i) {
            Ok(Some(value)) => value,
            _ => Value::Null,
        }
    } else if *column_type == Type::UUID {
        match row.try_get::<_, Option<Uuid>>(i) {
            Ok(Some(id)) => Value::String(id.to_string()),
            _ => Value::Null,
        }
    } else if *column_type == Type::DATE {
        stringify(row.try_get::<_, Option<chrono::NaiveDate>>(i))
    } else if *column_type == Type::TIMESTAMP {
        stringify(row.try_get::<_, Option<chrono::NaiveDateTime>>(i))
    } else if *column_type == Type::TIMESTAMPTZ {
        stringify(row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(i))
    } else if *column_type == Type::TIME {
        stringify(row.try_get::<_, Option<chrono::NaiveTime>>(i))
    } else {
        match row.try_get::<_, Option<String>>(i) {
            Ok(value) => json!(value),
            Err(_) => Value::String(format!("<{}>", column_type.name())),
        }
    }
}

fn opt<T: serde::Serialize>(value: Result<Option<T>, tokio_postgres::Error>) -> Value {
    match value {
        Ok(Some(v)) => json!(v),
        _ => Value::Null,
    }
}

fn stringify<T: std::fmt::Display>(value: Result<Option<T>, tokio_postgres::Error>) -> Value {
    match value {
        Ok(Some(v)) => Value::String(v.to_string()),
        _ => Value::Null,
    }
}
