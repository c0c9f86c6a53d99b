//! Dual-sink logging for the transfer add-on.
//!
//! `BftLogger` decorates every line with a prefix and mirrors info/warn/
//! error onto a live-status publish channel in addition to the local
//! `tracing` sink; debug lines stay local. `copy` derives a sibling logger
//! with a different prefix sharing the same channel, which is how the
//! transport session and the file-copy operation get their own labeled
//! streams without re-wiring collaborators.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The channel name the add-on publishes live status lines on.
pub const STATUS_CHANNEL: &str = "marlinbft";

/// Live-status publish sink supplied by the host application.
/// Real implementation: the host's push messaging. In-process
/// implementation: `BroadcastChannel`.
pub trait StatusChannel: Send + Sync {
    fn publish(&self, channel: &str, text: &str);
}

/// A status line as seen by in-process subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub channel: String,
    pub text: String,
}

/// In-process status channel over a tokio broadcast sender.
pub struct BroadcastChannel {
    tx: tokio::sync::broadcast::Sender<StatusLine>,
}

impl BroadcastChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StatusLine> {
        self.tx.subscribe()
    }
}

impl StatusChannel for BroadcastChannel {
    fn publish(&self, channel: &str, text: &str) {
        // Send fails only when nobody is subscribed; status lines are
        // best-effort either way.
        let _ = self.tx.send(StatusLine {
            channel: channel.to_string(),
            text: text.to_string(),
        });
    }
}

/// Logger that mirrors info/warn/error to the live-status channel.
#[derive(Clone)]
pub struct BftLogger {
    prefix: String,
    channel: Arc<dyn StatusChannel>,
}

impl BftLogger {
    pub fn new(channel: Arc<dyn StatusChannel>) -> Self {
        Self {
            prefix: "bft".to_string(),
            channel,
        }
    }

    /// Derive a logger with a different prefix sharing the same channel.
    pub fn copy(&self, prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            channel: self.channel.clone(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn info(&self, msg: &str) {
        info!("[{}] {}", self.prefix, msg);
        self.push(msg);
    }

    pub fn warn(&self, msg: &str) {
        warn!("[{}] {}", self.prefix, msg);
        self.push(msg);
    }

    pub fn error(&self, msg: &str) {
        error!("[{}] {}", self.prefix, msg);
        self.push(msg);
    }

    /// Debug lines go to the local sink only.
    pub fn debug(&self, msg: &str) {
        debug!("[{}] {}", self.prefix, msg);
    }

    fn push(&self, msg: &str) {
        self.channel
            .publish(STATUS_CHANNEL, &format!("[{}] {}", self.prefix, msg));
    }
}
