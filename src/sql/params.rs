//! Convert serde_json::Value to parameters sqlx can bind.

use crate::schema::SqlType;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// A bound parameter. Every value travels as text; the SQL casts the placeholder
/// (`$n::bigint`, `$n::timestamptz`, ...) to the column's type.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Text(String),
}

impl PgBindValue {
    /// Scalars as their text form; arrays and objects as JSON text.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::String(s) => PgBindValue::Text(s.clone()),
            other => PgBindValue::Text(other.to_string()),
        }
    }

    /// JSON document text, for `jsonb` targets (strings keep their quotes).
    pub fn json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            other => PgBindValue::Text(other.to_string()),
        }
    }

    pub fn for_type(v: &Value, sql_type: Option<SqlType>) -> Self {
        match sql_type {
            Some(SqlType::Jsonb) => PgBindValue::json(v),
            _ => PgBindValue::from_json(v),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => <Option<&str> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            PgBindValue::Text(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}
