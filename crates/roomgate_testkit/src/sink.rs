//! Recording stateless sink.

use parking_lot::Mutex;
use roomgate_protocol::{StatelessMessage, StatelessSink};
use std::sync::atomic::{AtomicBool, Ordering};

/// A [`StatelessSink`] that keeps every payload it is handed.
#[derive(Debug, Default)]
pub struct RecordingSink {
    payloads: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following send fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the raw payloads received.
    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().clone()
    }

    /// Returns the payloads received, decoded. Undecodable payloads are skipped.
    pub fn messages(&self) -> Vec<StatelessMessage> {
        self.payloads
            .lock()
            .iter()
            .filter_map(|p| StatelessMessage::decode(p).ok())
            .collect()
    }

    /// Returns the last message received.
    pub fn last(&self) -> Option<StatelessMessage> {
        self.messages().pop()
    }

    /// Forgets everything received so far.
    pub fn clear(&self) {
        self.payloads.lock().clear();
    }
}

impl StatelessSink for RecordingSink {
    fn send_stateless(&self, payload: &str) -> Result<(), String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("socket closed".into());
        }
        self.payloads.lock().push(payload.to_string());
        Ok(())
    }
}
