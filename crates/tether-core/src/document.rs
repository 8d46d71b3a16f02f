//! # Documents & Entity Codecs
//!
//! The untyped document model and the contract typed entities implement to
//! take part in sync.
//!
//! ## Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Entity Codec                                     │
//! │                                                                         │
//! │   Remote store                           Domain                         │
//! │   ────────────                           ──────                         │
//! │   DocumentSnapshot ── from_snapshot ──► T: Entity   (None = malformed)  │
//! │   { collection, id,                        │                            │
//! │     fields: Option<Fields> } ◄── to_fields ┘                            │
//! │                                                                         │
//! │   Changed Fields ──── apply_changes ───► T: Listenable (in place,       │
//! │                                          only keys present change)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `(collection, document_id)` is the natural key. There is no surrogate key.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// Untyped key → value mapping of one document.
pub type Fields = serde_json::Map<String, Value>;

// =============================================================================
// Snapshot
// =============================================================================

/// A raw document as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Collection the document lives in.
    pub collection: String,
    /// Document id within the collection.
    pub id: String,
    /// Document fields, `None` if the document does not exist.
    pub fields: Option<Fields>,
}

impl DocumentSnapshot {
    /// Snapshot of an existing document.
    pub fn new(collection: impl Into<String>, id: impl Into<String>, fields: Fields) -> Self {
        DocumentSnapshot {
            collection: collection.into(),
            id: id.into(),
            fields: Some(fields),
        }
    }

    /// Snapshot of a document that does not exist.
    pub fn missing(collection: impl Into<String>, id: impl Into<String>) -> Self {
        DocumentSnapshot {
            collection: collection.into(),
            id: id.into(),
            fields: None,
        }
    }

    /// Returns true if the document exists.
    #[inline]
    pub fn exists(&self) -> bool {
        self.fields.is_some()
    }

    /// Returns the fields of an existing document.
    #[inline]
    pub fn fields(&self) -> Option<&Fields> {
        self.fields.as_ref()
    }

    /// Returns a single field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.as_ref().and_then(|f| f.get(field))
    }

    /// Decodes the fields through serde.
    pub fn decode<T: DeserializeOwned>(&self) -> CoreResult<T> {
        let fields = self.fields.as_ref().ok_or_else(|| CoreError::Decode {
            collection: self.collection.clone(),
            id: self.id.clone(),
            reason: "document does not exist".to_string(),
        })?;
        from_fields(fields).map_err(|e| CoreError::Decode {
            collection: self.collection.clone(),
            id: self.id.clone(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// Entity Contract
// =============================================================================

/// A domain type with a stable remote document identity.
///
/// ## Example
/// ```rust
/// use tether_core::document::{from_fields, to_fields, DocumentSnapshot, Entity, Fields};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Profile {
///     #[serde(skip)]
///     id: String,
///     username: String,
/// }
///
/// impl Entity for Profile {
///     fn collection(&self) -> &str { "profiles" }
///     fn document_id(&self) -> &str { &self.id }
///     fn to_fields(&self) -> Fields { to_fields(self).unwrap_or_default() }
///     fn from_snapshot(snapshot: &DocumentSnapshot) -> Option<Self> {
///         let mut profile: Profile = from_fields(snapshot.fields()?).ok()?;
///         profile.id = snapshot.id.clone();
///         Some(profile)
///     }
/// }
/// ```
pub trait Entity: Sized {
    /// Collection the entity is stored in.
    fn collection(&self) -> &str;

    /// Document id of the entity.
    fn document_id(&self) -> &str;

    /// Serializes the entity to a field mapping.
    fn to_fields(&self) -> Fields;

    /// Builds the entity from a snapshot. Returns `None` on malformed data.
    fn from_snapshot(snapshot: &DocumentSnapshot) -> Option<Self>;
}

/// An entity that can fold a partial remote change into itself.
pub trait Listenable: Entity {
    /// Updates only the fields present in `changes`.
    fn apply_changes(&mut self, changes: &Fields);

    /// Value-semantics form of [`Listenable::apply_changes`].
    fn reconciled(mut self, changes: &Fields) -> Self {
        self.apply_changes(changes);
        self
    }
}

// =============================================================================
// Serde Bridges
// =============================================================================

/// Serializes any `Serialize` struct into a field mapping.
pub fn to_fields<T: Serialize>(value: &T) -> CoreResult<Fields> {
    match serde_json::to_value(value).map_err(|e| CoreError::Encode(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::Encode(format!(
            "expected an object, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Deserializes a field mapping into any `DeserializeOwned` type.
pub fn from_fields<T: DeserializeOwned>(fields: &Fields) -> serde_json::Result<T> {
    serde_json::from_value(Value::Object(fields.clone()))
}

/// Decodes a nested object value with a hand-written initializer.
pub fn decode_object<T>(value: &Value, init: impl Fn(&Fields) -> Option<T>) -> Option<T> {
    value.as_object().and_then(|map| init(map))
}

/// Decodes an array of nested objects, dropping elements that fail to decode.
pub fn decode_array<T>(values: &[Value], init: impl Fn(&Fields) -> Option<T>) -> Vec<T> {
    values
        .iter()
        .filter_map(|v| v.as_object().and_then(|map| init(map)))
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Write Semantics
// =============================================================================

/// Merges `incoming` into `target`.
///
/// Keys absent from `incoming` are untouched. Nested objects merge
/// recursively; every other value (arrays included) replaces the old one.
pub fn merge_fields(target: &mut Fields, incoming: Fields) {
    for (key, value) in incoming {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                merge_fields(existing, nested);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// A single-field update operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum FieldOp {
    /// Append the value unless an equal element is already present.
    ArrayUnion(Value),
    /// Remove every element equal to the value.
    ArrayRemove(Value),
    /// Overwrite the field.
    Replace(Value),
    /// In an array of maps, set `update_key` to `value` on every element
    /// whose `match_key` equals `match_value`. Other elements are untouched.
    UpdateWhere {
        match_key: String,
        match_value: Value,
        update_key: String,
        value: Value,
    },
}

/// Applies a field operation to a document's fields.
///
/// Array operations on a missing or non-array field start from an empty array.
pub fn apply_field_op(fields: &mut Fields, field: &str, op: FieldOp) {
    match op {
        FieldOp::Replace(value) => {
            fields.insert(field.to_string(), value);
        }
        FieldOp::ArrayUnion(value) => {
            let array = array_entry(fields, field);
            if !array.contains(&value) {
                array.push(value);
            }
        }
        FieldOp::ArrayRemove(value) => {
            array_entry(fields, field).retain(|v| v != &value);
        }
        FieldOp::UpdateWhere {
            match_key,
            match_value,
            update_key,
            value,
        } => {
            for item in array_entry(fields, field).iter_mut() {
                if let Value::Object(map) = item {
                    if map.get(&match_key) == Some(&match_value) {
                        map.insert(update_key.clone(), value.clone());
                    }
                }
            }
        }
    }
}

fn array_entry<'a>(fields: &'a mut Fields, field: &str) -> &'a mut Vec<Value> {
    let slot = fields
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just set to an array"),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Station {
        #[serde(skip)]
        id: String,
        name: String,
        #[serde(default)]
        chefs: Vec<String>,
        #[serde(default)]
        active: bool,
    }

    impl Entity for Station {
        fn collection(&self) -> &str {
            "stations"
        }

        fn document_id(&self) -> &str {
            &self.id
        }

        fn to_fields(&self) -> Fields {
            to_fields(self).unwrap_or_default()
        }

        fn from_snapshot(snapshot: &DocumentSnapshot) -> Option<Self> {
            let mut station: Station = from_fields(snapshot.fields()?).ok()?;
            station.id = snapshot.id.clone();
            Some(station)
        }
    }

    impl Listenable for Station {
        fn apply_changes(&mut self, changes: &Fields) {
            if let Some(name) = changes.get("name").and_then(Value::as_str) {
                self.name = name.to_string();
            }
            if let Some(active) = changes.get("active").and_then(Value::as_bool) {
                self.active = active;
            }
        }
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_entity_round_trip() {
        let station = Station {
            id: "grill".to_string(),
            name: "Grill".to_string(),
            chefs: vec!["ana".to_string(), "bo".to_string()],
            active: true,
        };
        let snapshot = DocumentSnapshot::new("stations", "grill", station.to_fields());
        assert_eq!(Station::from_snapshot(&snapshot), Some(station));
    }

    #[test]
    fn test_malformed_snapshot_decodes_to_none() {
        let snapshot = DocumentSnapshot::new("stations", "x", fields(json!({"name": 42})));
        assert!(Station::from_snapshot(&snapshot).is_none());
        assert!(Station::from_snapshot(&DocumentSnapshot::missing("stations", "x")).is_none());
    }

    #[test]
    fn test_apply_changes_touches_only_present_keys() {
        let station = Station {
            id: "grill".to_string(),
            name: "Grill".to_string(),
            chefs: vec!["ana".to_string()],
            active: false,
        };
        let updated = station.reconciled(&fields(json!({"active": true})));
        assert_eq!(updated.name, "Grill");
        assert_eq!(updated.chefs, vec!["ana".to_string()]);
        assert!(updated.active);
    }

    #[test]
    fn test_snapshot_decode_reports_context() {
        let snapshot = DocumentSnapshot::new("stations", "x", fields(json!({"name": 1})));
        let err = snapshot.decode::<Station>().unwrap_err();
        assert!(err.to_string().contains("stations/x"));

        let err = DocumentSnapshot::missing("stations", "y")
            .decode::<Station>()
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_to_fields_rejects_non_objects() {
        assert!(to_fields(&42).is_err());
        assert!(to_fields(&json!({"a": 1})).is_ok());
    }

    #[test]
    fn test_decode_array_drops_malformed_entries() {
        let values = vec![
            json!({"name": "Pass"}),
            json!("not an object"),
            json!({"name": 7}),
            json!({"name": "Pastry"}),
        ];
        let names = decode_array(&values, |m| {
            m.get("name").and_then(Value::as_str).map(str::to_string)
        });
        assert_eq!(names, vec!["Pass".to_string(), "Pastry".to_string()]);

        let single = decode_object(&json!({"name": "Fry"}), |m| m.get("name").cloned());
        assert_eq!(single, Some(json!("Fry")));
    }

    #[test]
    fn test_merge_fields_is_deep_for_objects() {
        let mut target = fields(json!({
            "name": "Grill",
            "hours": {"open": 9, "close": 17},
            "tags": ["a", "b"]
        }));
        merge_fields(
            &mut target,
            fields(json!({"hours": {"close": 22}, "tags": ["c"], "active": true})),
        );
        assert_eq!(
            Value::Object(target),
            json!({
                "name": "Grill",
                "hours": {"open": 9, "close": 22},
                "tags": ["c"],
                "active": true
            })
        );
    }

    #[test]
    fn test_field_ops() {
        let mut doc = fields(json!({"chefs": ["ana"], "name": "Grill"}));

        apply_field_op(&mut doc, "chefs", FieldOp::ArrayUnion(json!("bo")));
        apply_field_op(&mut doc, "chefs", FieldOp::ArrayUnion(json!("ana")));
        assert_eq!(doc["chefs"], json!(["ana", "bo"]));

        apply_field_op(&mut doc, "chefs", FieldOp::ArrayRemove(json!("ana")));
        assert_eq!(doc["chefs"], json!(["bo"]));

        // Non-array fields are reset before array operations
        apply_field_op(&mut doc, "name", FieldOp::ArrayUnion(json!("x")));
        assert_eq!(doc["name"], json!(["x"]));

        apply_field_op(&mut doc, "missing", FieldOp::ArrayRemove(json!(1)));
        assert_eq!(doc["missing"], json!([]));

        apply_field_op(&mut doc, "name", FieldOp::Replace(json!("Pass")));
        assert_eq!(doc["name"], json!("Pass"));
    }

    #[test]
    fn test_update_where_touches_matching_maps_only() {
        let mut doc = fields(json!({
            "tickets": [
                {"id": "t1", "status": "open"},
                {"id": "t2", "status": "open"},
                {"id": "t1", "status": "open", "note": "dup"},
                "loose",
                {"status": "open"}
            ]
        }));

        apply_field_op(
            &mut doc,
            "tickets",
            FieldOp::UpdateWhere {
                match_key: "id".into(),
                match_value: json!("t1"),
                update_key: "status".into(),
                value: json!("plated"),
            },
        );
        assert_eq!(
            doc["tickets"],
            json!([
                {"id": "t1", "status": "plated"},
                {"id": "t2", "status": "open"},
                {"id": "t1", "status": "plated", "note": "dup"},
                "loose",
                {"status": "open"}
            ])
        );

        // A key the element lacks is added
        apply_field_op(
            &mut doc,
            "tickets",
            FieldOp::UpdateWhere {
                match_key: "id".into(),
                match_value: json!("t2"),
                update_key: "station".into(),
                value: json!("grill"),
            },
        );
        assert_eq!(doc["tickets"][1], json!({"id": "t2", "status": "open", "station": "grill"}));

        // Matching compares JSON values, so 1 and "1" differ
        let mut doc = fields(json!({"rows": [{"n": 1}]}));
        let op = FieldOp::UpdateWhere {
            match_key: "n".into(),
            match_value: json!("1"),
            update_key: "seen".into(),
            value: json!(true),
        };
        apply_field_op(&mut doc, "rows", op);
        assert_eq!(doc["rows"], json!([{"n": 1}]));

        // Missing field becomes an empty array, as with the other array ops
        apply_field_op(
            &mut doc,
            "absent",
            FieldOp::UpdateWhere {
                match_key: "id".into(),
                match_value: json!("x"),
                update_key: "y".into(),
                value: json!(0),
            },
        );
        assert_eq!(doc["absent"], json!([]));
    }

    #[test]
    fn test_update_where_wire_shape() {
        let op = FieldOp::UpdateWhere {
            match_key: "id".into(),
            match_value: json!("t1"),
            update_key: "status".into(),
            value: json!("plated"),
        };
        let encoded = serde_json::to_value(&op).unwrap();
        assert_eq!(
            encoded,
            json!({
                "op": "update_where",
                "value": {
                    "match_key": "id",
                    "match_value": "t1",
                    "update_key": "status",
                    "value": "plated"
                }
            })
        );
        assert_eq!(serde_json::from_value::<FieldOp>(encoded).unwrap(), op);
    }
}
