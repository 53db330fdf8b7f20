//! User-facing notices (toasts).
//!
//! Pages never block on a notice; they push it onto an unbounded channel that
//! the bridge drains and forwards as `notice` events. Every notice is also
//! logged.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Warning | NoticeLevel::Error => {
                warn!(level = ?level, message = %message, "notice")
            }
            _ => info!(level = ?level, message = %message, "notice"),
        }
        // Receiver gone means the bridge shut down; nothing left to show it on.
        let _ = self.tx.send(Notice { level, message });
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Success, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Error, message);
    }
}

/// Collect everything currently queued without waiting.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        out.push(notice);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices_arrive_in_order() {
        let (notifier, mut rx) = Notifier::channel();
        notifier.warning("Item already added");
        notifier.success("Transfer created");
        let got = drain(&mut rx);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].level, NoticeLevel::Warning);
        assert_eq!(got[1].message, "Transfer created");
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.error("nobody listening");
    }
}
