//! Evening-reminder collaborator.
//!
//! Scheduling and badge handling live outside the engine; the engine only
//! tells the collaborator whether today already has a completed entry.

use tracing::{debug, info};

use daybook_shared::Identity;

pub trait ReminderNotifier: Send + Sync {
    /// Called after every load, feed batch or local guest mutation.
    fn on_entry_updated(&self, identity: &Identity, completed_today: bool);

    /// Called when today's entry is complete.
    fn clear_badge(&self);
}

/// Notifier that only logs; used by the CLI where no scheduler exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl ReminderNotifier for LogNotifier {
    fn on_entry_updated(&self, identity: &Identity, completed_today: bool) {
        debug!(identity = %identity, completed_today, "reminder re-evaluated");
    }

    fn clear_badge(&self) {
        info!("today's entry complete, badge cleared");
    }
}
