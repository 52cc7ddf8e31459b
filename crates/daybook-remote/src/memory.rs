//! In-process backend implementing [`RemoteStore`] and [`EntryFeed`].
//!
//! Behaves like the hosted document store the engine is written against:
//! documents get a generated id on creation, every committed write is pushed
//! to live subscribers in commit order, and blob URLs are opaque. Fault
//! injection hooks let tests exercise failure paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;
use uuid::Uuid;

use daybook_shared::constants::FIELD_PROFILE_IMAGE_URL;
use daybook_shared::{DateKey, UserId};

use crate::document::{Document, EntrySnapshot};
use crate::error::{RemoteError, Result};
use crate::feed::{ChangeKind, EntryFeed, FeedBatch, FeedChange, FeedSubscription};
use crate::store::{apply_field_ops, FieldUpdate, RemoteStore, Transaction};

/// Scheme of the URLs handed out by [`MemoryBackend::upload_blob`].
pub const MEMORY_URL_SCHEME: &str = "memory://";

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<UserId, BTreeMap<DateKey, StoredDocument>>,
    blobs: HashMap<String, Bytes>,
    profiles: HashMap<UserId, Document>,
    subscribers: HashMap<UserId, Vec<mpsc::UnboundedSender<FeedBatch>>>,
    faults: Faults,
}

struct StoredDocument {
    id: String,
    fields: Document,
}

impl StoredDocument {
    fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot::new(self.id.clone(), self.fields.clone())
    }
}

#[derive(Default)]
struct Faults {
    uploads: bool,
    writes_for: HashSet<DateKey>,
    empty_downloads: u32,
    upload_gate: Option<Arc<Semaphore>>,
}

impl Inner {
    fn publish(&mut self, user: &UserId, change: FeedChange) {
        if let Some(senders) = self.subscribers.get_mut(user) {
            senders.retain(|tx| tx.send(vec![change.clone()]).is_ok());
        }
    }

    fn check_write(&self, date: DateKey) -> Result<()> {
        if self.faults.writes_for.contains(&date) {
            return Err(RemoteError::Network(format!("injected write failure for {date}")));
        }
        Ok(())
    }

    // Mutate an existing document and publish `Modified` if it changed.
    fn modify_existing(&mut self, user: &UserId, date: DateKey, f: impl FnOnce(&mut Document)) {
        let Some(doc) = self.documents.get_mut(user).and_then(|docs| docs.get_mut(&date)) else {
            return;
        };
        let before = doc.fields.clone();
        f(&mut doc.fields);
        if doc.fields != before {
            let snapshot = doc.snapshot();
            self.publish(user, FeedChange::new(ChangeKind::Modified, snapshot));
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -- inspection ---------------------------------------------------------

    pub fn document(&self, user: &UserId, date: DateKey) -> Option<Document> {
        self.lock()
            .documents
            .get(user)
            .and_then(|docs| docs.get(&date))
            .map(|doc| doc.fields.clone())
    }

    pub fn document_id(&self, user: &UserId, date: DateKey) -> Option<String> {
        self.lock()
            .documents
            .get(user)
            .and_then(|docs| docs.get(&date))
            .map(|doc| doc.id.clone())
    }

    pub fn document_count(&self, user: &UserId) -> usize {
        self.lock().documents.get(user).map_or(0, BTreeMap::len)
    }

    pub fn blob(&self, url: &str) -> Option<Bytes> {
        self.lock().blobs.get(url).cloned()
    }

    pub fn blob_count(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn profile_image(&self, user: &UserId) -> Option<String> {
        self.lock()
            .profiles
            .get(user)
            .and_then(|profile| profile.get(FIELD_PROFILE_IMAGE_URL))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn subscriber_count(&self, user: &UserId) -> usize {
        let mut inner = self.lock();
        match inner.subscribers.get_mut(user) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }

    // -- direct manipulation (another device writing) -----------------------

    /// Write a document as if another client did, bypassing fault injection.
    pub fn put_document(&self, user: &UserId, date: DateKey, fields: Document) -> String {
        let mut inner = self.lock();
        let docs = inner.documents.entry(user.clone()).or_default();
        let (kind, snapshot) = match docs.get_mut(&date) {
            Some(doc) => {
                doc.fields = fields;
                (ChangeKind::Modified, doc.snapshot())
            }
            None => {
                let doc = StoredDocument {
                    id: Uuid::new_v4().to_string(),
                    fields,
                };
                let snapshot = doc.snapshot();
                docs.insert(date, doc);
                (ChangeKind::Added, snapshot)
            }
        };
        let id = snapshot.id.clone();
        inner.publish(user, FeedChange::new(kind, snapshot));
        id
    }

    pub fn remove_document(&self, user: &UserId, date: DateKey) -> bool {
        let mut inner = self.lock();
        let removed = inner
            .documents
            .get_mut(user)
            .and_then(|docs| docs.remove(&date));
        match removed {
            Some(doc) => {
                let snapshot = doc.snapshot();
                inner.publish(user, FeedChange::new(ChangeKind::Removed, snapshot));
                true
            }
            None => false,
        }
    }

    // -- fault injection ----------------------------------------------------

    pub fn fail_uploads(&self, fail: bool) {
        self.lock().faults.uploads = fail;
    }

    pub fn fail_writes_for(&self, date: DateKey) {
        self.lock().faults.writes_for.insert(date);
    }

    /// Answer the next `count` downloads with an empty body.
    pub fn empty_downloads(&self, count: u32) {
        self.lock().faults.empty_downloads = count;
    }

    /// Park every upload until [`release_uploads`](Self::release_uploads) or
    /// [`resume_uploads`](Self::resume_uploads).
    pub fn hold_uploads(&self) {
        self.lock().faults.upload_gate = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_uploads(&self, count: usize) {
        if let Some(gate) = &self.lock().faults.upload_gate {
            gate.add_permits(count);
        }
    }

    pub fn resume_uploads(&self) {
        if let Some(gate) = self.lock().faults.upload_gate.take() {
            gate.close();
        }
    }

    pub fn clear_faults(&self) {
        let gate = std::mem::take(&mut self.lock().faults).upload_gate;
        if let Some(gate) = gate {
            gate.close();
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryBackend {
    async fn upsert_merge(&self, user: &UserId, date: DateKey, fields: FieldUpdate) -> Result<()> {
        let mut inner = self.lock();
        inner.check_write(date)?;

        let docs = inner.documents.entry(user.clone()).or_default();
        let change = match docs.get_mut(&date) {
            Some(doc) => {
                let before = doc.fields.clone();
                apply_field_ops(&mut doc.fields, fields);
                (doc.fields != before).then(|| FeedChange::new(ChangeKind::Modified, doc.snapshot()))
            }
            None => {
                let mut doc = StoredDocument {
                    id: Uuid::new_v4().to_string(),
                    fields: Document::new(),
                };
                apply_field_ops(&mut doc.fields, fields);
                let snapshot = doc.snapshot();
                docs.insert(date, doc);
                Some(FeedChange::new(ChangeKind::Added, snapshot))
            }
        };

        debug!(user = %user, date = %date, changed = change.is_some(), "upsert_merge");
        if let Some(change) = change {
            inner.publish(user, change);
        }
        Ok(())
    }

    async fn run_transaction(
        &self,
        user: &UserId,
        date: DateKey,
        update: Transaction,
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.check_write(date)?;
        inner.modify_existing(user, date, update);
        Ok(())
    }

    async fn upload_blob(&self, path: &str, data: Bytes) -> Result<String> {
        let gate = self.lock().faults.upload_gate.clone();
        if let Some(gate) = gate {
            // A closed gate means uploads were resumed.
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut inner = self.lock();
        if inner.faults.uploads {
            return Err(RemoteError::Network(format!("injected upload failure for {path}")));
        }
        let url = format!("{MEMORY_URL_SCHEME}{path}");
        inner.blobs.insert(url.clone(), data);
        Ok(url)
    }

    async fn delete_blob(&self, url: &str) -> Result<()> {
        match self.lock().blobs.remove(url) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(url.to_string())),
        }
    }

    async fn download_blob(&self, url: &str) -> Result<Bytes> {
        let mut inner = self.lock();
        if inner.faults.empty_downloads > 0 {
            inner.faults.empty_downloads -= 1;
            return Ok(Bytes::new());
        }
        inner
            .blobs
            .get(url)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(url.to_string()))
    }

    async fn set_profile_image(&self, user: &UserId, url: &str) -> Result<()> {
        self.lock()
            .profiles
            .entry(user.clone())
            .or_default()
            .insert(FIELD_PROFILE_IMAGE_URL.to_string(), Value::String(url.to_string()));
        Ok(())
    }
}

#[async_trait]
impl EntryFeed for MemoryBackend {
    async fn subscribe(&self, user: &UserId) -> Result<FeedSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();

        let initial: FeedBatch = inner
            .documents
            .get(user)
            .map(|docs| {
                docs.values()
                    .map(|doc| FeedChange::new(ChangeKind::Added, doc.snapshot()))
                    .collect()
            })
            .unwrap_or_default();

        // Cannot fail: `rx` is still held here.
        let _ = tx.send(initial);
        inner.subscribers.entry(user.clone()).or_default().push(tx);

        debug!(user = %user, "feed subscription opened");
        Ok(FeedSubscription::new(rx))
    }
}
