//! Purpose: Transient, auto-dismissing notifications raised by the client view.
//! Exports: `Notification`, `Severity`, `NOTIFICATION_TTL`, `notification_json`.
//! Role: Shared contract between the view state machine and terminal rendering.
//! Invariants: A notification is visible for exactly `NOTIFICATION_TTL` after it is raised.
//! Invariants: JSON schema is additive-only; `retry` is present only for failures.
use serde_json::{Map, Value, json};
use std::time::{Duration, Instant};

pub const NOTIFICATION_TTL: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Success,
    Info,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Info => "info",
            Severity::Error => "error",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub raised_at: Instant,
    pub retryable: bool,
}

impl Notification {
    pub fn new(message: impl Into<String>, severity: Severity, raised_at: Instant) -> Self {
        Self {
            message: message.into(),
            severity,
            raised_at,
            retryable: false,
        }
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn is_visible_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.raised_at) < NOTIFICATION_TTL
    }
}

pub fn notification_json(notification: &Notification) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notification.severity.as_str()));
    inner.insert("message".to_string(), json!(notification.message));
    if notification.retryable {
        inner.insert("retry".to_string(), json!(true));
    }

    let mut outer = Map::new();
    outer.insert("notice".to_string(), Value::Object(inner));
    Value::Object(outer)
}
