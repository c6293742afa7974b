//! Session-based flash messaging.
//!
//! Flash messages are one-time notifications carried in the session under a
//! reserved key, shown once and then discarded. Messages are inserted at
//! the head of the stored list and consumed from the tail, so full
//! consumption is FIFO and a consumer that stops early leaves the
//! oldest-sent unread messages in place for a later read.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::Request;
use crate::session::Session;

/// Session key the messages live under unless overridden.
pub const DEFAULT_KEY: &str = "flash";

/// Severity of a flash message.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Info,
    Warning,
    Error,
}

/// One flash message.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FlashMessage {
    pub level: Level,
    pub message: String,
}

/// Flash queue over a session.
pub struct Flash {
    session: Session,
    key: String,
}

impl Flash {
    pub fn new(session: Session) -> Self {
        Self::with_key(session, DEFAULT_KEY)
    }

    /// Uses a custom session key instead of [`DEFAULT_KEY`].
    pub fn with_key(session: Session, key: impl Into<String>) -> Self {
        Self {
            session,
            key: key.into(),
        }
    }

    /// Sends a flash message.
    ///
    /// Consumption pops from the tail of the list, so inserting at the head
    /// preserves FIFO delivery.
    pub fn send(&self, level: Level, message: impl Into<String>) {
        let entry = serde_json::to_value(FlashMessage {
            level,
            message: message.into(),
        })
        .expect("flash message serializes");

        self.session.mutate_if(|data| {
            match data.get_mut(&self.key).and_then(Value::as_array_mut) {
                Some(list) => list.insert(0, entry),
                None => {
                    data.insert(self.key.clone(), Value::Array(vec![entry]));
                }
            }
            (true, ())
        });
    }

    /// Shortcut for sending a message with level `success`.
    pub fn success(&self, message: impl Into<String>) {
        self.send(Level::Success, message);
    }

    /// Shortcut for sending a message with level `info`.
    pub fn info(&self, message: impl Into<String>) {
        self.send(Level::Info, message);
    }

    /// Shortcut for sending a message with level `warning`.
    pub fn warning(&self, message: impl Into<String>) {
        self.send(Level::Warning, message);
    }

    /// Shortcut for sending a message with level `error`.
    pub fn error(&self, message: impl Into<String>) {
        self.send(Level::Error, message);
    }

    /// Number of pending messages.
    pub fn len(&self) -> usize {
        self.session.peek(|data| {
            data.get(&self.key)
                .and_then(Value::as_array)
                .map_or(0, Vec::len)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A lazy, single-pass iterator over the pending messages, oldest-sent
    /// first. Each message is removed from the session as it is consumed,
    /// so stopping early leaves the rest queued.
    pub fn get_and_clear(&self) -> Drain {
        Drain {
            session: self.session.clone(),
            key: self.key.clone(),
        }
    }
}

/// Iterator returned by [`Flash::get_and_clear`].
pub struct Drain {
    session: Session,
    key: String,
}

impl Iterator for Drain {
    type Item = FlashMessage;

    fn next(&mut self) -> Option<FlashMessage> {
        self.session.mutate_if(|data| {
            match data.get_mut(&self.key).and_then(Value::as_array_mut) {
                Some(list) => match list.pop() {
                    Some(entry) => (true, serde_json::from_value(entry).ok()),
                    None => (false, None),
                },
                None => (false, None),
            }
        })
    }
}

/// Template context processor: drains the request's flash messages into a
/// `flash` context entry.
pub fn context_processor(req: &Request) -> serde_json::Map<String, Value> {
    let messages: Vec<FlashMessage> = req.flash().get_and_clear().collect();
    let mut context = serde_json::Map::new();
    context.insert(
        "flash".to_string(),
        serde_json::to_value(messages).expect("flash messages serialize"),
    );
    context
}
