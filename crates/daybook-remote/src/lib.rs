// Remote collaborators of the journal engine: the document database, blob
// storage and the live entry feed, expressed as traits so the engine never
// depends on a vendor SDK. `MemoryBackend` is a complete in-process
// implementation of both traits.

pub mod document;
pub mod error;
pub mod feed;
pub mod loader;
pub mod memory;
pub mod store;

pub use document::{date_fields, decode_entry, Document, EntrySnapshot};
pub use error::{RemoteError, Result};
pub use feed::{ChangeKind, EntryFeed, FeedBatch, FeedChange, FeedSubscription};
pub use loader::{DirectFetch, HttpFetcher, ImageLoad, ImageLoader};
pub use memory::MemoryBackend;
pub use store::{apply_field_ops, date_update, FieldOp, FieldUpdate, RemoteStore, Transaction};
