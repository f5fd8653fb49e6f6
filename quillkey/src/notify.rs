use std::fmt;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Severity::Info, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(Severity::Success, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(Severity::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Severity::Error, message.into());
    }

    fn emit(&self, severity: Severity, message: String) {
        match severity {
            Severity::Info | Severity::Success => info!(%severity, "notify: {message}"),
            Severity::Warning => warn!("notify: {message}"),
            Severity::Error => error!("notify: {message}"),
        }
        if self.tx.send(Notification { severity, message }).is_err() {
            debug!("no notification subscribers");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_messages_in_order() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier.warning("busy");
        notifier.success("done");

        let first = rx.try_recv().expect("first notification");
        let second = rx.try_recv().expect("second notification");
        assert_eq!(first.severity, Severity::Warning);
        assert_eq!(first.message, "busy");
        assert_eq!(second.severity, Severity::Success);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let notifier = Notifier::new();
        notifier.error("nobody listening");
    }
}
