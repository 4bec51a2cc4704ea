use std::fmt;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{error, info, warn};

/// Messages kept before the oldest unread ones are dropped.
pub const STATUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLevel::Info => f.write_str("info"),
            StatusLevel::Warning => f.write_str("warning"),
            StatusLevel::Error => f.write_str("error"),
        }
    }
}

/// One human-readable line for whoever is watching the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.text)
    }
}

/// Append-only status stream. The session never reads it back.
///
/// Sending never fails: when nobody drains the feed the oldest message is
/// dropped to make room.
#[derive(Debug, Clone)]
pub struct StatusChannel {
    tx: Sender<StatusMessage>,
    rx: Receiver<StatusMessage>,
}

impl StatusChannel {
    pub fn new() -> Self {
        let (tx, rx) = bounded(STATUS_CAPACITY);
        Self { tx, rx }
    }

    /// Receivers share one stream; each message is delivered once.
    pub fn feed(&self) -> Receiver<StatusMessage> {
        self.rx.clone()
    }

    pub fn info(&self, text: impl Into<String>) {
        self.send(StatusLevel::Info, text.into());
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.send(StatusLevel::Warning, text.into());
    }

    pub fn error(&self, text: impl Into<String>) {
        self.send(StatusLevel::Error, text.into());
    }

    pub fn send(&self, level: StatusLevel, text: String) {
        match level {
            StatusLevel::Info => info!(status = %text),
            StatusLevel::Warning => warn!(status = %text),
            StatusLevel::Error => error!(status = %text),
        }
        let mut message = StatusMessage { level, text };
        loop {
            match self.tx.try_send(message) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    let _ = self.rx.try_recv();
                    message = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}
