//! Desktop style notifications shown when an alarm starts ringing.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use log::info;

use crate::alarm::Alarm;

pub const NOW_PLAYING: &str = "🔔 Now Playing";
pub const SCHEDULED: &str = "🔔 Scheduled Audio";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    #[must_use]
    pub fn for_alarm(alarm: &Alarm, interrupting: bool) -> Self {
        Self {
            title: if interrupting { NOW_PLAYING } else { SCHEDULED }.to_string(),
            body: alarm.describe(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.body)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

pub trait Notifier {
    /// Asked once at startup; an unavailable notifier is never called.
    fn is_available(&self) -> bool;

    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn is_available(&self) -> bool {
        true
    }

    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!("{notification}");
        Ok(())
    }
}

/// Keeps every notification it is given. Clones share the history.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    pub available: bool,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new(available: bool) -> Self {
        Self {
            sent: Arc::default(),
            available,
        }
    }

    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn is_available(&self) -> bool {
        self.available
    }

    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }
}
