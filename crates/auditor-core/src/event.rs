use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::format::{EventFormatter, SimpleFormatter};

/// Severity of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("INFO"),
            Severity::Error => f.write_str("ERROR"),
        }
    }
}

/// A single audited action: who did what, when, and from where.
///
/// Events are assembled with the consuming `with_*` methods and then moved
/// into a sink, so a recorded event can no longer be changed by its
/// producer.
///
/// ```rust
/// use auditor_core::{AuditEvent, Severity};
///
/// let event = AuditEvent::new("Login")
///     .with_actor("alice")
///     .with_session("s1")
///     .with_origin("127.0.0.1")
///     .with_error_message("bad password");
///
/// assert_eq!(event.severity(), Severity::Error);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    id: uuid::Uuid,
    severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    actor: Option<String>,
    timestamp: DateTime<Utc>,
    action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    context: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl AuditEvent {
    /// Create an info-level event for `action`, stamped with the current
    /// UTC time and a fresh UUID v4.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            severity: Severity::Info,
            actor: None,
            timestamp: Utc::now(),
            action: action.into(),
            session: None,
            origin: None,
            context: BTreeMap::new(),
            error_message: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Add (or replace) one contextual metadata entry.
    pub fn with_context_value(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Replace the whole contextual metadata map.
    pub fn with_context(mut self, context: BTreeMap<String, serde_json::Value>) -> Self {
        self.context = context;
        self
    }

    /// Attach an error message. This also raises the severity to
    /// [`Severity::Error`].
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self.severity = Severity::Error;
        self
    }

    /// Fill in the actor only if the event does not carry one yet.
    pub fn or_actor(mut self, actor: Option<String>) -> Self {
        if self.actor.is_none() {
            self.actor = actor;
        }
        self
    }

    /// Fill in the session only if the event does not carry one yet.
    pub fn or_session(mut self, session: Option<String>) -> Self {
        if self.session.is_none() {
            self.session = session;
        }
        self
    }

    /// Fill in the origin only if the event does not carry one yet.
    pub fn or_origin(mut self, origin: Option<String>) -> Self {
        if self.origin.is_none() {
            self.origin = origin;
        }
        self
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Effective severity. An event carrying an error message is always
    /// [`Severity::Error`], whatever order the setters were called in.
    pub fn severity(&self) -> Severity {
        if self.error_message.is_some() {
            Severity::Error
        } else {
            self.severity
        }
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn context(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.context
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = SimpleFormatter::default()
            .format(self)
            .map_err(|_| fmt::Error)?;
        f.write_str(&line)
    }
}
