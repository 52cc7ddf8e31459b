//! # daybook-store
//!
//! On-device persistence for guest (offline) mode.
//!
//! Entries live in a small SQLite database, one row per calendar day, while
//! captured images and audio takes are plain files under a blob directory.
//! Both are synchronous: the engine that owns them runs on a single task and
//! every operation is a short local disk access.

pub mod blobs;
pub mod database;
pub mod entries;
pub mod guest;
pub mod migrations;
pub mod profile;

mod error;

pub use blobs::BlobStore;
pub use database::Database;
pub use error::{Result, StoreError};
pub use guest::GuestStore;
