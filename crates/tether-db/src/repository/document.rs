//! # Document Repository
//!
//! Stores untyped documents keyed by `(collection, doc_id)`.
//!
//! ## Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Document Writes                                    │
//! │                                                                         │
//! │  set(merge = false)            set(merge = true)       patch_field      │
//! │       │                              │                      │           │
//! │       │                    ┌─────────▼──────────────────────▼────────┐  │
//! │       │                    │          SINGLE TRANSACTION             │  │
//! │       │                    │  1. SELECT fields WHERE key = ?         │  │
//! │       │                    │  2. merge_fields / apply_field_op       │  │
//! │       │                    │  3. UPSERT                              │  │
//! │       │                    └─────────┬───────────────────────────────┘  │
//! │       ▼                              ▼                                  │
//! │  UPSERT ON CONFLICT(collection, doc_id) DO UPDATE                      │
//! │  (seq and created_at survive, so listings keep first-insert order)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tether_core::document::{apply_field_op, merge_fields};
use tether_core::{DocumentSnapshot, FieldOp, Fields};

/// A document row as stored locally.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub collection: String,
    pub id: String,
    pub fields: Fields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredDocument {
    /// Converts the row into a snapshot of an existing document.
    pub fn into_snapshot(self) -> DocumentSnapshot {
        DocumentSnapshot::new(self.collection, self.id, self.fields)
    }
}

/// Repository for document operations.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str = "SELECT collection, doc_id, fields, created_at, updated_at FROM documents";

impl DocumentRepository {
    /// Creates a new DocumentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DocumentRepository { pool }
    }

    /// Gets a document by key.
    ///
    /// ## Returns
    /// * `Ok(Some(doc))` - Document exists
    /// * `Ok(None)` - Document was never written or was deleted
    pub async fn get(&self, collection: &str, id: &str) -> DbResult<Option<StoredDocument>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE collection = ?1 AND doc_id = ?2"))
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_row).transpose()
    }

    /// Writes a document.
    ///
    /// With `merge = false` the stored fields are replaced wholesale. With
    /// `merge = true` the incoming fields are deep-merged into whatever is
    /// stored, creating the document if needed.
    pub async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> DbResult<StoredDocument> {
        debug!(collection = %collection, id = %id, merge, "Writing document");

        let mut tx = self.pool.begin().await?;

        let existing = fetch_in_tx(&mut tx, collection, id).await?;
        let (created_at, fields) = match existing {
            Some(mut doc) if merge => {
                merge_fields(&mut doc.fields, fields);
                (doc.created_at, doc.fields)
            }
            Some(doc) => (doc.created_at, fields),
            None => (Utc::now(), fields),
        };

        let stored = upsert_in_tx(&mut tx, collection, id, fields, created_at).await?;
        tx.commit().await?;

        Ok(stored)
    }

    /// Applies a single-field operation to an existing document.
    ///
    /// ## Errors
    /// * `DbError::NotFound` - The document does not exist
    pub async fn patch_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        op: FieldOp,
    ) -> DbResult<StoredDocument> {
        debug!(collection = %collection, id = %id, field = %field, "Patching field");

        let mut tx = self.pool.begin().await?;

        let mut doc = fetch_in_tx(&mut tx, collection, id)
            .await?
            .ok_or_else(|| DbError::not_found(collection, id))?;
        apply_field_op(&mut doc.fields, field, op);

        let stored = upsert_in_tx(&mut tx, collection, id, doc.fields, doc.created_at).await?;
        tx.commit().await?;

        Ok(stored)
    }

    /// Deletes a document. Returns true if a row was removed.
    pub async fn delete(&self, collection: &str, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!(collection = %collection, id = %id, removed = result.rows_affected(), "Deleted document");
        Ok(result.rows_affected() > 0)
    }

    /// Lists every document in a collection, in first-insert order.
    pub async fn list(&self, collection: &str) -> DbResult<Vec<StoredDocument>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE collection = ?1 ORDER BY seq"))
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_row).collect()
    }

    /// Lists documents whose top-level `field` equals `value`, in first-insert
    /// order.
    ///
    /// SQLite narrows the rows with `json_type`/`json_extract`, so only
    /// documents whose field has the same JSON type (and, for text, integers
    /// and literals, the same value) are decoded. Reals, arrays and objects
    /// are narrowed by type only. The final comparison is always on decoded
    /// values. There is no index on field values: each call scans the
    /// collection's rows inside SQLite.
    ///
    /// A field name containing `"` cannot be written as a JSON path, so it
    /// falls back to decoding the whole collection.
    pub async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> DbResult<Vec<StoredDocument>> {
        let candidates = if field.contains('"') {
            self.list(collection).await?
        } else {
            let rows = sqlx::query(&format!(
                "{SELECT_COLUMNS} WHERE collection = ?1 \
                 AND json_type(fields, ?2) = json_type(?3) \
                 AND (json_type(?3) IN ('real', 'array', 'object') \
                      OR json_extract(fields, ?2) IS json_extract(?3, '$')) \
                 ORDER BY seq"
            ))
            .bind(collection)
            .bind(format!("$.\"{field}\""))
            .bind(serde_json::to_string(value)?)
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(decode_row).collect::<DbResult<Vec<_>>>()?
        };

        Ok(candidates
            .into_iter()
            .filter(|doc| doc.fields.get(field) == Some(value))
            .collect())
    }

    /// Counts the documents in a collection.
    pub async fn count(&self, collection: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?1")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Row Helpers
// =============================================================================

async fn fetch_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    collection: &str,
    id: &str,
) -> DbResult<Option<StoredDocument>> {
    let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE collection = ?1 AND doc_id = ?2"))
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

    row.as_ref().map(decode_row).transpose()
}

async fn upsert_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    collection: &str,
    id: &str,
    fields: Fields,
    created_at: DateTime<Utc>,
) -> DbResult<StoredDocument> {
    let now = Utc::now();
    let payload = serde_json::to_string(&fields)?;

    sqlx::query(
        r#"
        INSERT INTO documents (collection, doc_id, fields, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (collection, doc_id) DO UPDATE SET
            fields = excluded.fields,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(collection)
    .bind(id)
    .bind(&payload)
    .bind(created_at)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(StoredDocument {
        collection: collection.to_string(),
        id: id.to_string(),
        fields,
        created_at,
        updated_at: now,
    })
}

fn decode_row(row: &SqliteRow) -> DbResult<StoredDocument> {
    let collection: String = row.try_get("collection")?;
    let id: String = row.try_get("doc_id")?;
    let raw: String = row.try_get("fields")?;

    let fields = match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            return Err(DbError::Corrupt {
                collection,
                id,
                reason: "fields are not a JSON object".to_string(),
            })
        }
        Err(e) => {
            return Err(DbError::Corrupt {
                collection,
                id,
                reason: e.to_string(),
            })
        }
    };

    Ok(StoredDocument {
        collection,
        id,
        fields,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde_json::json;

    async fn repo() -> DocumentRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.documents()
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let repo = repo().await;
        assert!(repo.get("users", "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_replace_and_merge() {
        let repo = repo().await;

        repo.set("users", "u1", fields(json!({"name": "Ada", "age": 36})), false)
            .await
            .unwrap();

        // Merge keeps untouched keys
        repo.set("users", "u1", fields(json!({"age": 37})), true)
            .await
            .unwrap();
        let doc = repo.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(Value::Object(doc.fields), json!({"name": "Ada", "age": 37}));

        // Replace drops them
        repo.set("users", "u1", fields(json!({"age": 38})), false)
            .await
            .unwrap();
        let doc = repo.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(Value::Object(doc.fields), json!({"age": 38}));
    }

    #[tokio::test]
    async fn test_merge_creates_missing_document() {
        let repo = repo().await;
        repo.set("users", "u2", fields(json!({"name": "Bo"})), true)
            .await
            .unwrap();
        assert_eq!(repo.count("users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_keeps_first_insert_order() {
        let repo = repo().await;
        for id in ["b", "a", "c"] {
            repo.set("stations", id, fields(json!({"id": id})), false)
                .await
                .unwrap();
        }
        // Rewriting "b" must not move it to the end
        repo.set("stations", "b", fields(json!({"id": "b", "hot": true})), false)
            .await
            .unwrap();

        let ids: Vec<String> = repo
            .list("stations")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = repo().await;
        repo.set("users", "u1", fields(json!({"x": 1})), false)
            .await
            .unwrap();
        assert!(repo.delete("users", "u1").await.unwrap());
        assert!(!repo.delete("users", "u1").await.unwrap());
        assert!(repo.get("users", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_field() {
        let repo = repo().await;
        repo.set("profiles", "p1", fields(json!({"username": "ada"})), false)
            .await
            .unwrap();
        repo.set("profiles", "p2", fields(json!({"username": "bo"})), false)
            .await
            .unwrap();

        let found = repo
            .find_by_field("profiles", "username", &json!("bo"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "p2");

        let none = repo
            .find_by_field("profiles", "username", &json!("cy"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_find_by_field_compares_json_values() {
        let repo = repo().await;
        let rows = [
            ("a", json!({"rank": 1, "line.cook": true, "hours": {"open": 9}})),
            ("b", json!({"rank": "1", "line.cook": 1, "hours": {"open": 10}})),
            ("c", json!({"rank": 1.5, "line.cook": false, "hours": null})),
            ("d", json!({"name": "no rank"})),
            ("e", json!({"rank": 1, "say\"hi": "x"})),
        ];
        for (id, value) in rows {
            repo.set("staff", id, fields(value), false).await.unwrap();
        }
        repo.set("other", "a", fields(json!({"rank": 1})), false)
            .await
            .unwrap();

        let ids = |docs: Vec<StoredDocument>| docs.into_iter().map(|d| d.id).collect::<Vec<_>>();

        // Number and string with the same text stay distinct; insert order is kept
        let found = repo.find_by_field("staff", "rank", &json!(1)).await.unwrap();
        assert_eq!(ids(found), vec!["a", "e"]);
        let found = repo.find_by_field("staff", "rank", &json!("1")).await.unwrap();
        assert_eq!(ids(found), vec!["b"]);
        let found = repo.find_by_field("staff", "rank", &json!(1.5)).await.unwrap();
        assert_eq!(ids(found), vec!["c"]);

        // Dotted names are one top-level key; true is not 1
        let found = repo.find_by_field("staff", "line.cook", &json!(true)).await.unwrap();
        assert_eq!(ids(found), vec!["a"]);
        let found = repo.find_by_field("staff", "line.cook", &json!(1)).await.unwrap();
        assert_eq!(ids(found), vec!["b"]);

        // Objects and explicit null
        let found = repo
            .find_by_field("staff", "hours", &json!({"open": 10}))
            .await
            .unwrap();
        assert_eq!(ids(found), vec!["b"]);
        let found = repo.find_by_field("staff", "hours", &Value::Null).await.unwrap();
        assert_eq!(ids(found), vec!["c"]);

        // Quoted field names take the decoding path
        let found = repo.find_by_field("staff", "say\"hi", &json!("x")).await.unwrap();
        assert_eq!(ids(found), vec!["e"]);
    }

    #[tokio::test]
    async fn test_patch_field_update_where() {
        let repo = repo().await;
        repo.set(
            "orders",
            "o1",
            fields(json!({"tickets": [
                {"id": "t1", "status": "open"},
                {"id": "t2", "status": "open"}
            ]})),
            false,
        )
        .await
        .unwrap();

        let stored = repo
            .patch_field(
                "orders",
                "o1",
                "tickets",
                FieldOp::UpdateWhere {
                    match_key: "id".into(),
                    match_value: json!("t2"),
                    update_key: "status".into(),
                    value: json!("plated"),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            stored.fields["tickets"],
            json!([{"id": "t1", "status": "open"}, {"id": "t2", "status": "plated"}])
        );
        let reloaded = repo.get("orders", "o1").await.unwrap().unwrap();
        assert_eq!(reloaded.fields, stored.fields);
    }

    #[tokio::test]
    async fn test_patch_field() {
        let repo = repo().await;
        repo.set("stations", "grill", fields(json!({"chefs": ["ana"]})), false)
            .await
            .unwrap();

        let doc = repo
            .patch_field("stations", "grill", "chefs", FieldOp::ArrayUnion(json!("bo")))
            .await
            .unwrap();
        assert_eq!(doc.fields["chefs"], json!(["ana", "bo"]));

        let err = repo
            .patch_field("stations", "nope", "chefs", FieldOp::Replace(json!([])))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
