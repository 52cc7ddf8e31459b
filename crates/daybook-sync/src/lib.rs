//! # daybook-sync
//!
//! The journal reconciliation engine.
//!
//! A single task owns the canonical list of entries for the attached
//! identity. UI calls and feed batches are both funnelled into that task as
//! commands, so the list is never touched concurrently. Network work (blob
//! uploads, remote deletes) runs in detached tasks that post their results
//! back as further commands.

pub mod config;
pub mod engine;
pub mod entries;
pub mod media;
pub mod migration;
pub mod notify;

mod error;

pub use config::EngineConfig;
pub use engine::{spawn_engine, EngineDeps, JournalHandle};
pub use entries::EntryList;
pub use error::{Result, SyncError};
pub use migration::{migrate_guest, MigrationReport};
pub use notify::{LogNotifier, ReminderNotifier};
