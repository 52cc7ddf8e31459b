//! Live entry feed.
//!
//! A subscription first yields one batch holding every existing document (all
//! marked `Added`), then one batch per committed write. Dropping the
//! [`FeedSubscription`] unsubscribes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use daybook_shared::{JournalEntry, UserId};

use crate::document::EntrySnapshot;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One document change with the full snapshot after the change.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedChange {
    pub kind: ChangeKind,
    pub snapshot: EntrySnapshot,
}

impl FeedChange {
    pub fn new(kind: ChangeKind, snapshot: EntrySnapshot) -> Self {
        Self { kind, snapshot }
    }

    pub fn entry(&self) -> JournalEntry {
        self.snapshot.to_entry()
    }
}

pub type FeedBatch = Vec<FeedChange>;

/// Receiving half of a feed subscription.
#[derive(Debug)]
pub struct FeedSubscription {
    batches: mpsc::UnboundedReceiver<FeedBatch>,
}

impl FeedSubscription {
    pub fn new(batches: mpsc::UnboundedReceiver<FeedBatch>) -> Self {
        Self { batches }
    }

    /// Next batch, or `None` once the backend closed the subscription.
    pub async fn next_batch(&mut self) -> Option<FeedBatch> {
        self.batches.recv().await
    }

    /// A batch that is already queued, without waiting.
    pub fn try_next_batch(&mut self) -> Option<FeedBatch> {
        self.batches.try_recv().ok()
    }
}

#[async_trait]
pub trait EntryFeed: Send + Sync {
    /// Open a live subscription on `user`'s entries.
    async fn subscribe(&self, user: &UserId) -> Result<FeedSubscription>;
}
