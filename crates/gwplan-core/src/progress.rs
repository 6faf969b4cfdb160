//! One-way progress reporting. Sinks never feed back into planning.

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub message: String,
    pub percent: u8,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, message: &str, percent: u8);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _message: &str, _percent: u8) {}
}

/// Forwards events to a channel; a closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, message: &str, percent: u8) {
        let ev = ProgressEvent { message: message.to_string(), percent: percent.min(100) };
        let _ = self.tx.send(ev);
    }
}
