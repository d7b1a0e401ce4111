//! SQL value bridge
//!
//! Runtime representation of PostgreSQL values used both as query parameters
//! and as decoded result cells. Higher layers never touch driver row types.

use crate::errors::CarehausError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A PostgreSQL value crossing the session boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Text(String),
    Integer(i32),
    BigInt(i64),
    Float(f64),
    Boolean(bool),
    Uuid(Uuid),
    Timestamp(chrono::DateTime<chrono::Utc>),
    Json(serde_json::Value),
    Null,
}

impl From<String> for SqlValue {
    fn from(val: String) -> Self {
        SqlValue::Text(val)
    }
}

impl From<&str> for SqlValue {
    fn from(val: &str) -> Self {
        SqlValue::Text(val.to_string())
    }
}

impl From<i32> for SqlValue {
    fn from(val: i32) -> Self {
        SqlValue::Integer(val)
    }
}

impl From<i64> for SqlValue {
    fn from(val: i64) -> Self {
        SqlValue::BigInt(val)
    }
}

impl From<f64> for SqlValue {
    fn from(val: f64) -> Self {
        SqlValue::Float(val)
    }
}

impl From<bool> for SqlValue {
    fn from(val: bool) -> Self {
        SqlValue::Boolean(val)
    }
}

impl From<Uuid> for SqlValue {
    fn from(val: Uuid) -> Self {
        SqlValue::Uuid(val)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for SqlValue {
    fn from(val: chrono::DateTime<chrono::Utc>) -> Self {
        SqlValue::Timestamp(val)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(val: serde_json::Value) -> Self {
        SqlValue::Json(val)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(val: Option<T>) -> Self {
        match val {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

/// A decoded result row
#[derive(Debug, Clone, Default)]
pub struct SqlRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Raw cell lookup by column name
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    fn require(&self, column: &str) -> Result<&SqlValue, CarehausError> {
        self.get(column).ok_or_else(|| {
            CarehausError::internal(format!("column '{}' missing from result row", column))
        })
    }

    fn mismatch(column: &str, expected: &str, got: &SqlValue) -> CarehausError {
        CarehausError::internal(format!(
            "column '{}' has unexpected type (expected {}, got {:?})",
            column, expected, got
        ))
    }

    pub fn get_text(&self, column: &str) -> Result<String, CarehausError> {
        match self.require(column)? {
            SqlValue::Text(v) => Ok(v.clone()),
            other => Err(Self::mismatch(column, "text", other)),
        }
    }

    pub fn get_i32(&self, column: &str) -> Result<i32, CarehausError> {
        match self.require(column)? {
            SqlValue::Integer(v) => Ok(*v),
            other => Err(Self::mismatch(column, "integer", other)),
        }
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, CarehausError> {
        match self.require(column)? {
            SqlValue::BigInt(v) => Ok(*v),
            SqlValue::Integer(v) => Ok(i64::from(*v)),
            other => Err(Self::mismatch(column, "bigint", other)),
        }
    }

    pub fn get_bool(&self, column: &str) -> Result<bool, CarehausError> {
        match self.require(column)? {
            SqlValue::Boolean(v) => Ok(*v),
            other => Err(Self::mismatch(column, "boolean", other)),
        }
    }

    pub fn get_uuid(&self, column: &str) -> Result<Uuid, CarehausError> {
        match self.require(column)? {
            SqlValue::Uuid(v) => Ok(*v),
            other => Err(Self::mismatch(column, "uuid", other)),
        }
    }

    pub fn get_timestamp(
        &self,
        column: &str,
    ) -> Result<chrono::DateTime<chrono::Utc>, CarehausError> {
        match self.require(column)? {
            SqlValue::Timestamp(v) => Ok(*v),
            other => Err(Self::mismatch(column, "timestamptz", other)),
        }
    }

    pub fn get_json(&self, column: &str) -> Result<serde_json::Value, CarehausError> {
        match self.require(column)? {
            SqlValue::Json(v) => Ok(v.clone()),
            other => Err(Self::mismatch(column, "jsonb", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_row() -> SqlRow {
        SqlRow::new(
            vec![
                "id".to_string(),
                "resource_type".to_string(),
                "version_id".to_string(),
                "content".to_string(),
            ],
            vec![
                SqlValue::Uuid(Uuid::nil()),
                SqlValue::Text("Patient".to_string()),
                SqlValue::Integer(1),
                SqlValue::Json(json!({"resourceType": "Patient"})),
            ],
        )
    }

    #[test]
    fn test_typed_getters() {
        let row = sample_row();
        assert_eq!(row.get_uuid("id").unwrap(), Uuid::nil());
        assert_eq!(row.get_text("resource_type").unwrap(), "Patient");
        assert_eq!(row.get_i32("version_id").unwrap(), 1);
        assert_eq!(
            row.get_json("content").unwrap(),
            json!({"resourceType": "Patient"})
        );
    }

    #[test]
    fn test_integer_widens_to_bigint() {
        let row = sample_row();
        assert_eq!(row.get_i64("version_id").unwrap(), 1);
    }

    #[test]
    fn test_missing_column_is_internal_error() {
        let row = sample_row();
        let err = row.get_text("nope").unwrap_err();
        assert!(matches!(err, CarehausError::Internal { .. }));
    }

    #[test]
    fn test_type_mismatch_is_internal_error() {
        let row = sample_row();
        let err = row.get_bool("resource_type").unwrap_err();
        assert!(matches!(err, CarehausError::Internal { .. }));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(SqlValue::from(Some(5i32)), SqlValue::Integer(5));
        assert_eq!(SqlValue::from(Option::<i32>::None), SqlValue::Null);
    }
}
