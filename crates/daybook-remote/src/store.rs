//! Remote mutation API consumed by the engine.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use daybook_shared::{DateKey, UserId};

use crate::document::{date_fields, Document};
use crate::error::Result;

/// One field-level write inside a merge.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Overwrite the field.
    Set(Value),
    /// Append each value not already present, without touching the rest of
    /// the array. Concurrent unions never clobber each other.
    ArrayUnion(Vec<Value>),
    /// Drop every element equal to one of the values.
    ArrayRemove(Vec<Value>),
    /// Remove the field.
    Delete,
}

/// Ordered field writes applied as a single merge.
pub type FieldUpdate = Vec<(String, FieldOp)>;

/// Read-modify-write step run atomically against the current document.
pub type Transaction = Box<dyn FnOnce(&mut Document) + Send>;

/// `Set` ops for the date-key fields. Every merge carries them so a
/// document created by the merge is addressable by day.
pub fn date_update(date: DateKey) -> FieldUpdate {
    date_fields(date)
        .into_iter()
        .map(|(field, value)| (field, FieldOp::Set(value)))
        .collect()
}

/// Apply `ops` to `doc` with merge semantics.
pub fn apply_field_ops(doc: &mut Document, ops: FieldUpdate) {
    for (field, op) in ops {
        match op {
            FieldOp::Set(value) => {
                doc.insert(field, value);
            }
            FieldOp::ArrayUnion(values) => {
                let slot = doc
                    .entry(field)
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !slot.is_array() {
                    *slot = Value::Array(Vec::new());
                }
                if let Value::Array(items) = slot {
                    for value in values {
                        if !items.contains(&value) {
                            items.push(value);
                        }
                    }
                }
            }
            FieldOp::ArrayRemove(values) => {
                if let Some(Value::Array(items)) = doc.get_mut(&field) {
                    items.retain(|item| !values.contains(item));
                }
            }
            FieldOp::Delete => {
                doc.remove(&field);
            }
        }
    }
}

/// Document database plus blob storage for signed-in users.
///
/// Documents are addressed by `(user, date)`; blobs by a storage path on
/// upload and by the returned URL afterwards.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Merge `fields` into the day's document, creating it if absent.
    async fn upsert_merge(&self, user: &UserId, date: DateKey, fields: FieldUpdate) -> Result<()>;

    /// Append `value` to an array field exactly once.
    async fn union_append(
        &self,
        user: &UserId,
        date: DateKey,
        field: &str,
        value: Value,
    ) -> Result<()> {
        self.upsert_merge(user, date, vec![(field.to_string(), FieldOp::ArrayUnion(vec![value]))])
            .await
    }

    /// Remove one field. A missing document is not an error.
    async fn delete_field(&self, user: &UserId, date: DateKey, field: &str) -> Result<()> {
        let ops = vec![(field.to_string(), FieldOp::Delete)];
        self.run_transaction(user, date, Box::new(move |doc: &mut Document| apply_field_ops(doc, ops)))
            .await
    }

    /// Run `update` as a read-modify-write transaction on an existing
    /// document. A missing document is not an error.
    async fn run_transaction(&self, user: &UserId, date: DateKey, update: Transaction)
        -> Result<()>;

    /// Store `data` at `path` and return its durable download URL.
    async fn upload_blob(&self, path: &str, data: Bytes) -> Result<String>;

    /// Delete the blob behind `url`; `RemoteError::NotFound` if it is gone.
    async fn delete_blob(&self, url: &str) -> Result<()>;

    async fn download_blob(&self, url: &str) -> Result<Bytes>;

    /// Record the profile picture URL for `user`.
    async fn set_profile_image(&self, user: &UserId, url: &str) -> Result<()>;
}
