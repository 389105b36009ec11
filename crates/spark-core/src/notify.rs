//! Completion notifications.
//!
//! The countdown store only describes what should happen to the pending
//! notification ([`NotificationCommand`]). [`NotificationGateway`] carries it
//! out against a platform [`Notifier`], remembering the id of the one pending
//! notification so it can be replaced or cancelled later.
//!
//! Every call here is best-effort: failures are reported to the error log and
//! never reach the timer operation that caused them.

use crate::error::Result;
use crate::log::{LogRecord, SharedErrorLog};
use crate::timer::NotificationCommand;

/// Minimum lead time for a scheduled notification.
const MIN_LEAD_MS: i64 = 1000;

/// Platform notification backend.
pub trait Notifier: Send + Sync {
    /// Schedule a notification at `trigger_at_ms` (ms since epoch).
    /// Returns an id usable with [`Notifier::cancel`], if the backend has one.
    fn schedule(&self, title: &str, body: &str, trigger_at_ms: i64) -> Result<Option<String>>;

    fn cancel(&self, id: &str) -> Result<()>;
}

/// Writes notifications to the log instead of a notification centre.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn schedule(&self, title: &str, body: &str, trigger_at_ms: i64) -> Result<Option<String>> {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(%id, trigger_at_ms, "notification scheduled: {title} - {body}");
        Ok(Some(id))
    }

    fn cancel(&self, id: &str) -> Result<()> {
        tracing::info!(%id, "notification cancelled");
        Ok(())
    }
}

/// Drops every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn schedule(&self, _title: &str, _body: &str, _trigger_at_ms: i64) -> Result<Option<String>> {
        Ok(None)
    }

    fn cancel(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}

/// Executes [`NotificationCommand`]s, tracking the single pending notification.
pub struct NotificationGateway {
    notifier: Box<dyn Notifier>,
    pending: Option<String>,
    enabled: bool,
    log: SharedErrorLog,
}

impl NotificationGateway {
    pub fn new(notifier: Box<dyn Notifier>, log: SharedErrorLog) -> Self {
        Self {
            notifier,
            pending: None,
            enabled: true,
            log,
        }
    }

    /// When disabled, schedule requests are dropped; cancels still go through.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn pending_id(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn execute(&mut self, command: NotificationCommand, now_ms: i64) {
        match command {
            NotificationCommand::Schedule {
                title,
                body,
                trigger_at_ms,
            } => self.schedule(&title, &body, trigger_at_ms, now_ms),
            NotificationCommand::Cancel => self.cancel(),
        }
    }

    fn schedule(&mut self, title: &str, body: &str, trigger_at_ms: i64, now_ms: i64) {
        self.cancel();
        if !self.enabled {
            return;
        }
        let trigger_at_ms = trigger_at_ms.max(now_ms.saturating_add(MIN_LEAD_MS));
        match self.notifier.schedule(title, body, trigger_at_ms) {
            Ok(id) => self.pending = id,
            Err(e) => self.log.error(
                &LogRecord::new("NotificationGateway", "schedule", "Failed to schedule notification")
                    .with_error(e),
            ),
        }
    }

    fn cancel(&mut self) {
        let Some(id) = self.pending.take() else {
            return;
        };
        if let Err(e) = self.notifier.cancel(&id) {
            self.log.error(
                &LogRecord::new("NotificationGateway", "cancel", format!("Failed to cancel notification {id}"))
                    .with_error(e),
            );
        }
    }
}
