//! Resource store
//!
//! Versioned CRUD and identifier search over the `resources` table. Every
//! operation comes in two forms: an `_in` variant that runs on the caller's
//! transaction handle, and a pool-level convenience variant that wraps itself
//! in `with_transaction`.

use crate::resource::{Resource, RESOURCE_COLUMNS};
use crate::validation::validate_content;
use serde_json::{json, Value};
use sqlx::PgPool;
use tx_system::connection::ConnectionHandle;
use tx_system::errors::CarehausError;
use tx_system::executor::{with_transaction, TxOptions};
use tx_system::value::SqlValue;
use uuid::Uuid;

/// Store for healthcare resources
#[derive(Clone)]
pub struct ResourceStore {
    pool: PgPool,
}

impl std::fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore").finish()
    }
}

/// Copy the assigned id and resource type into the stored body
fn stamp(mut content: Value, resource_type: &str, id: Uuid) -> Value {
    if let Some(object) = content.as_object_mut() {
        object.insert("resourceType".to_string(), json!(resource_type));
        object.insert("id".to_string(), json!(id.to_string()));
    }
    content
}

impl ResourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---- transaction-handle operations ----

    /// Create a resource within the caller's transaction
    pub async fn create_in(
        &self,
        ch: &ConnectionHandle,
        resource_type: &str,
        content: Value,
    ) -> Result<Resource, CarehausError> {
        validate_content(resource_type, &content)?;
        let id = Uuid::new_v4();
        let content = stamp(content, resource_type, id);

        let sql = format!(
            "INSERT INTO resources (id, resource_type, version_id, last_updated, content) \
             VALUES ($1, $2, 1, now(), $3) RETURNING {}",
            RESOURCE_COLUMNS
        );
        let rows = ch
            .query(
                &sql,
                &[
                    SqlValue::Uuid(id),
                    SqlValue::Text(resource_type.to_string()),
                    SqlValue::Json(content),
                ],
            )
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| CarehausError::internal("insert returned no row"))?;
        Resource::from_row(row)
    }

    /// Read a resource within the caller's transaction
    pub async fn read_in(
        &self,
        ch: &ConnectionHandle,
        resource_type: &str,
        id: Uuid,
    ) -> Result<Resource, CarehausError> {
        self.read_optional_in(ch, resource_type, id)
            .await?
            .ok_or_else(|| CarehausError::not_found(resource_type, id))
    }

    pub async fn read_optional_in(
        &self,
        ch: &ConnectionHandle,
        resource_type: &str,
        id: Uuid,
    ) -> Result<Option<Resource>, CarehausError> {
        let sql = format!(
            "SELECT {} FROM resources WHERE id = $1 AND resource_type = $2",
            RESOURCE_COLUMNS
        );
        let rows = ch
            .query(
                &sql,
                &[
                    SqlValue::Uuid(id),
                    SqlValue::Text(resource_type.to_string()),
                ],
            )
            .await?;
        rows.first().map(Resource::from_row).transpose()
    }

    /// Update a resource within the caller's transaction
    ///
    /// When `expected_version` is supplied the update only applies if the
    /// stored version still matches; a concurrent writer that got there first
    /// surfaces as a conflict. Without it the update is last-writer-wins but
    /// still bumps the version.
    pub async fn update_in(
        &self,
        ch: &ConnectionHandle,
        resource_type: &str,
        id: Uuid,
        content: Value,
        expected_version: Option<i32>,
    ) -> Result<Resource, CarehausError> {
        validate_content(resource_type, &content)?;
        let content = stamp(content, resource_type, id);

        let mut sql = String::from(
            "UPDATE resources SET content = $1, version_id = version_id + 1, \
             last_updated = now() WHERE id = $2 AND resource_type = $3",
        );
        let mut params = vec![
            SqlValue::Json(content),
            SqlValue::Uuid(id),
            SqlValue::Text(resource_type.to_string()),
        ];
        if let Some(version) = expected_version {
            sql.push_str(" AND version_id = $4");
            params.push(SqlValue::Integer(version));
        }
        sql.push_str(&format!(" RETURNING {}", RESOURCE_COLUMNS));

        let rows = ch.query(&sql, &params).await?;
        match rows.first() {
            Some(row) => Resource::from_row(row),
            None => {
                // Distinguish a vanished row from a version race
                if self.read_optional_in(ch, resource_type, id).await?.is_some() {
                    Err(CarehausError::conflict(format!(
                        "Version mismatch updating {}/{}",
                        resource_type, id
                    )))
                } else {
                    Err(CarehausError::not_found(resource_type, id))
                }
            }
        }
    }

    /// Delete a resource within the caller's transaction
    pub async fn delete_in(
        &self,
        ch: &ConnectionHandle,
        resource_type: &str,
        id: Uuid,
    ) -> Result<(), CarehausError> {
        let affected = ch
            .execute(
                "DELETE FROM resources WHERE id = $1 AND resource_type = $2",
                &[
                    SqlValue::Uuid(id),
                    SqlValue::Text(resource_type.to_string()),
                ],
            )
            .await?;
        if affected == 0 {
            return Err(CarehausError::not_found(resource_type, id));
        }
        Ok(())
    }

    /// Search by primary id within the caller's transaction
    pub async fn search_by_id_in(
        &self,
        ch: &ConnectionHandle,
        resource_type: &str,
        id: Uuid,
    ) -> Result<Vec<Resource>, CarehausError> {
        let sql = format!(
            "SELECT {} FROM resources WHERE resource_type = $1 AND id = $2",
            RESOURCE_COLUMNS
        );
        let rows = ch
            .query(
                &sql,
                &[
                    SqlValue::Text(resource_type.to_string()),
                    SqlValue::Uuid(id),
                ],
            )
            .await?;
        rows.iter().map(Resource::from_row).collect()
    }

    /// Search by identifier value within the caller's transaction
    ///
    /// Matches resources whose `identifier` array contains an entry with the
    /// given `value`, via JSONB containment.
    pub async fn search_by_identifier_in(
        &self,
        ch: &ConnectionHandle,
        resource_type: &str,
        identifier: &str,
    ) -> Result<Vec<Resource>, CarehausError> {
        let sql = format!(
            "SELECT {} FROM resources \
             WHERE resource_type = $1 AND content->'identifier' @> $2 \
             ORDER BY last_updated",
            RESOURCE_COLUMNS
        );
        let needle = json!([{ "value": identifier }]);
        let rows = ch
            .query(
                &sql,
                &[
                    SqlValue::Text(resource_type.to_string()),
                    SqlValue::Json(needle),
                ],
            )
            .await?;
        rows.iter().map(Resource::from_row).collect()
    }

    /// Search-then-create within the caller's transaction
    ///
    /// Returns the existing resource when one already carries the identifier,
    /// otherwise creates. This layer permits duplicates under default
    /// isolation; callers wanting uniqueness run the enclosing transaction
    /// serializable.
    pub async fn conditional_create_in(
        &self,
        ch: &ConnectionHandle,
        resource_type: &str,
        identifier: &str,
        content: Value,
    ) -> Result<(Resource, bool), CarehausError> {
        let existing = self
            .search_by_identifier_in(ch, resource_type, identifier)
            .await?;
        if let Some(found) = existing.into_iter().next() {
            return Ok((found, false));
        }
        let created = self.create_in(ch, resource_type, content).await?;
        Ok((created, true))
    }

    // ---- pool-level conveniences ----

    /// Create a resource in its own transaction
    pub async fn create(
        &self,
        resource_type: &str,
        content: Value,
    ) -> Result<Resource, CarehausError> {
        let store = self.clone();
        let resource_type = resource_type.to_string();
        with_transaction(&self.pool, TxOptions::new(), move |ch| async move {
            store.create_in(&ch, &resource_type, content).await
        })
        .await
    }

    /// Read a resource in its own transaction
    pub async fn read(&self, resource_type: &str, id: Uuid) -> Result<Resource, CarehausError> {
        let store = self.clone();
        let resource_type = resource_type.to_string();
        with_transaction(&self.pool, TxOptions::new(), move |ch| async move {
            store.read_in(&ch, &resource_type, id).await
        })
        .await
    }

    /// Update a resource in its own transaction
    pub async fn update(
        &self,
        resource_type: &str,
        id: Uuid,
        content: Value,
        expected_version: Option<i32>,
    ) -> Result<Resource, CarehausError> {
        let store = self.clone();
        let resource_type = resource_type.to_string();
        with_transaction(&self.pool, TxOptions::new(), move |ch| async move {
            store
                .update_in(&ch, &resource_type, id, content, expected_version)
                .await
        })
        .await
    }

    /// Delete a resource in its own transaction
    pub async fn delete(&self, resource_type: &str, id: Uuid) -> Result<(), CarehausError> {
        let store = self.clone();
        let resource_type = resource_type.to_string();
        with_transaction(&self.pool, TxOptions::new(), move |ch| async move {
            store.delete_in(&ch, &resource_type, id).await
        })
        .await
    }

    /// Search by primary id in its own transaction
    pub async fn search_by_id(
        &self,
        resource_type: &str,
        id: Uuid,
    ) -> Result<Vec<Resource>, CarehausError> {
        let store = self.clone();
        let resource_type = resource_type.to_string();
        with_transaction(&self.pool, TxOptions::new(), move |ch| async move {
            store.search_by_id_in(&ch, &resource_type, id).await
        })
        .await
    }

    /// Search by identifier in its own transaction
    pub async fn search_by_identifier(
        &self,
        resource_type: &str,
        identifier: &str,
    ) -> Result<Vec<Resource>, CarehausError> {
        let store = self.clone();
        let resource_type = resource_type.to_string();
        let identifier = identifier.to_string();
        with_transaction(&self.pool, TxOptions::new(), move |ch| async move {
            store
                .search_by_identifier_in(&ch, &resource_type, &identifier)
                .await
        })
        .await
    }

    /// Conditional create in its own transaction
    ///
    /// Pass `TxOptions::serializable()` to make the search-then-create race
    /// detectable: one of two concurrent callers is rejected with a
    /// serialization conflict instead of a duplicate slipping through.
    pub async fn conditional_create(
        &self,
        resource_type: &str,
        identifier: &str,
        content: Value,
        options: TxOptions,
    ) -> Result<(Resource, bool), CarehausError> {
        let store = self.clone();
        let resource_type = resource_type.to_string();
        let identifier = identifier.to_string();
        with_transaction(&self.pool, options, move |ch| async move {
            store
                .conditional_create_in(&ch, &resource_type, &identifier, content)
                .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_overwrites_id_and_type() {
        let id = Uuid::new_v4();
        let stamped = stamp(
            json!({"resourceType": "Patient", "id": "stale", "active": true}),
            "Patient",
            id,
        );
        assert_eq!(stamped["id"], json!(id.to_string()));
        assert_eq!(stamped["resourceType"], json!("Patient"));
        assert_eq!(stamped["active"], json!(true));
    }

    #[test]
    fn test_stamp_leaves_non_objects_alone() {
        let stamped = stamp(json!("scalar"), "Patient", Uuid::nil());
        assert_eq!(stamped, json!("scalar"));
    }
}
