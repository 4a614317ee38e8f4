use serde::Serialize;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::trace;

/// Event sent from a running batch to the caller
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RunEvent {
    /// Overall progress, 0-100
    Progress { value: u8, text: String },
    /// Operator-facing log line
    Log { message: String },
    /// Emitted once when the batch ends
    Finished { success: bool },
}

/// Receives progress and log lines of a batch run
pub trait ProgressSink: Send + Sync {
    fn progress(&self, value: u8, text: &str);

    fn log(&self, message: &str);

    fn finished(&self, _success: bool) {}
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn progress(&self, _value: u8, _text: &str) {}

    fn log(&self, _message: &str) {}
}

/// Sink forwarding events over a channel to another thread
pub struct ChannelProgress {
    tx: Sender<RunEvent>,
}

impl ChannelProgress {
    /// Create a sink and the receiving end of its channel
    pub fn new() -> (Self, Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: RunEvent) {
        // Receiver gone: the caller stopped listening
        if let Err(e) = self.tx.send(event) {
            trace!(event = ?e.0, "progress receiver dropped");
        }
    }
}

impl ProgressSink for ChannelProgress {
    fn progress(&self, value: u8, text: &str) {
        self.emit(RunEvent::Progress {
            value: value.min(100),
            text: text.to_string(),
        });
    }

    fn log(&self, message: &str) {
        self.emit(RunEvent::Log {
            message: message.to_string(),
        });
    }

    fn finished(&self, success: bool) {
        self.emit(RunEvent::Finished { success });
    }
}
