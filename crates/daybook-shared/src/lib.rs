// Shared domain types for the Daybook journal: date keys, identities,
// entries and pending images, plus the document field names every layer
// agrees on.

pub mod constants;
pub mod entry;
pub mod error;
pub mod types;

pub use entry::{JournalEntry, JournalImage};
pub use error::SharedError;
pub use types::{DateKey, Identity, UserId};
