//! Stored resource model

use serde::{Deserialize, Serialize};
use tx_system::errors::CarehausError;
use tx_system::value::SqlRow;
use uuid::Uuid;

/// Column list shared by every statement that reads resources back
pub(crate) const RESOURCE_COLUMNS: &str = "id, resource_type, version_id, last_updated, content";

/// One stored healthcare resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub resource_type: String,
    /// Monotonic version, bumped on every update
    pub version_id: i32,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    /// The resource body as stored
    pub content: serde_json::Value,
}

impl Resource {
    pub(crate) fn from_row(row: &SqlRow) -> Result<Self, CarehausError> {
        Ok(Self {
            id: row.get_uuid("id")?,
            resource_type: row.get_text("resource_type")?,
            version_id: row.get_i32("version_id")?,
            last_updated: row.get_timestamp("last_updated")?,
            content: row.get_json("content")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tx_system::value::SqlValue;

    #[test]
    fn test_from_row() {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let row = SqlRow::new(
            vec![
                "id".to_string(),
                "resource_type".to_string(),
                "version_id".to_string(),
                "last_updated".to_string(),
                "content".to_string(),
            ],
            vec![
                SqlValue::Uuid(id),
                SqlValue::Text("Patient".to_string()),
                SqlValue::Integer(3),
                SqlValue::Timestamp(now),
                SqlValue::Json(json!({"resourceType": "Patient"})),
            ],
        );

        let resource = Resource::from_row(&row).unwrap();
        assert_eq!(resource.id, id);
        assert_eq!(resource.resource_type, "Patient");
        assert_eq!(resource.version_id, 3);
        assert_eq!(resource.last_updated, now);
    }

    #[test]
    fn test_from_row_missing_column_fails() {
        let row = SqlRow::new(vec!["id".to_string()], vec![SqlValue::Uuid(Uuid::nil())]);
        assert!(Resource::from_row(&row).is_err());
    }
}
