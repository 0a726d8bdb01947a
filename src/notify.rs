//! User-visible notifications
//!
//! Failures that the user should see (a panel failing while the frame is
//! paused, for instance) are reported through a [`Notifier`] injected into the
//! pipeline, never through a process-wide handler. The UI layer typically
//! installs a [`ChannelNotifier`] and drains it each frame.

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

/// Channel capacity for notifications (pipeline → UI).
const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationSeverity {
    Error,
    Warn,
    Info,
}

/// Where the notification originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationSource {
    /// Raised by the application itself
    App,
    /// Raised in response to user input
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub details: Option<String>,
    pub source: NotificationSource,
    pub severity: NotificationSeverity,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        message: impl Into<String>,
        details: Option<String>,
        source: NotificationSource,
        severity: NotificationSeverity,
    ) -> Self {
        Self {
            message: message.into(),
            details,
            source,
            severity,
            timestamp: Utc::now(),
        }
    }

    /// Application error with details
    pub fn error(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(
            message,
            Some(details.into()),
            NotificationSource::App,
            NotificationSeverity::Error,
        )
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(message, None, NotificationSource::App, NotificationSeverity::Warn)
    }
}

/// Sink for user-visible notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        let details = n.details.as_deref().unwrap_or("");
        match n.severity {
            NotificationSeverity::Error => {
                tracing::error!(source = ?n.source, "{} {}", n.message, details)
            }
            NotificationSeverity::Warn => {
                tracing::warn!(source = ?n.source, "{} {}", n.message, details)
            }
            NotificationSeverity::Info => {
                tracing::info!(source = ?n.source, "{} {}", n.message, details)
            }
        }
    }
}

/// Forwards notifications to a channel drained by the UI thread
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: Sender<Notification>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end for the UI
    pub fn new() -> (Self, Receiver<Notification>) {
        let (tx, rx) = bounded(NOTIFICATION_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                tracing::warn!("Notification channel full, dropping: {}", n.message);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_notifier_delivers() {
        let (notifier, rx) = ChannelNotifier::new();
        notifier.notify(Notification::error("Panel failed", "boom"));

        let n = rx.try_recv().unwrap();
        assert_eq!(n.message, "Panel failed");
        assert_eq!(n.details.as_deref(), Some("boom"));
        assert_eq!(n.severity, NotificationSeverity::Error);
        assert_eq!(n.source, NotificationSource::App);
    }

    #[test]
    fn test_channel_notifier_drops_when_full() {
        let (notifier, rx) = ChannelNotifier::new();
        for i in 0..NOTIFICATION_CHANNEL_CAPACITY + 10 {
            notifier.notify(Notification::warn(format!("n{}", i)));
        }
        assert_eq!(rx.len(), NOTIFICATION_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_channel_notifier_ignores_disconnected_ui() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify(Notification::warn("nobody listening"));
    }
}
