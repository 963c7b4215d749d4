//! Conversion of [`AuditEvent`]s into single lines of text.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};

use crate::error::AuditError;
use crate::event::AuditEvent;

/// Timestamp pattern used by [`SimpleFormatter::default`].
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Turns an event into one line of text, without a line terminator.
///
/// Implementations must be pure: no I/O and no shared mutable state.
pub trait EventFormatter: Send + Sync {
    fn format(&self, event: &AuditEvent) -> Result<String, AuditError>;
}

/// The default line format:
///
/// ```text
/// [timestamp] actor? session? origin? - action context? - error?
/// ```
///
/// Optional fields are skipped together with their separator when they are
/// absent or empty. Field values are written verbatim, so values containing
/// a newline will break line framing for downstream readers.
#[derive(Debug, Clone)]
pub struct SimpleFormatter {
    timestamp_format: String,
}

impl Default for SimpleFormatter {
    fn default() -> Self {
        Self {
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl SimpleFormatter {
    /// Build a formatter that renders timestamps with a chrono `strftime`
    /// pattern. The pattern is validated up front.
    pub fn with_timestamp_format(pattern: impl Into<String>) -> Result<Self, AuditError> {
        let timestamp_format = pattern.into();
        validate_timestamp_format(&timestamp_format)?;
        Ok(Self { timestamp_format })
    }

    pub fn timestamp_format(&self) -> &str {
        &self.timestamp_format
    }
}

impl EventFormatter for SimpleFormatter {
    fn format(&self, event: &AuditEvent) -> Result<String, AuditError> {
        let mut line = String::with_capacity(64 + event.action().len());

        line.push('[');
        write!(line, "{}", event.timestamp().format(&self.timestamp_format))
            .map_err(|_| AuditError::Format("timestamp could not be rendered".into()))?;
        line.push_str("] ");

        for field in [event.actor(), event.session(), event.origin()]
            .into_iter()
            .flatten()
        {
            if !field.is_empty() {
                line.push_str(field);
                line.push(' ');
            }
        }

        line.push_str("- ");
        line.push_str(event.action());

        if !event.context().is_empty() {
            line.push(' ');
            line.push_str(&render_context(event.context()));
        }

        if let Some(message) = event.error_message().filter(|m| !m.is_empty()) {
            line.push_str(" - ");
            line.push_str(message);
        }

        Ok(line)
    }
}

/// Render a context map as `{key=value, ...}`. Strings are written without
/// quotes; every other value is written as JSON.
pub fn render_context(context: &BTreeMap<String, serde_json::Value>) -> String {
    let mut out = String::from("{");
    for (i, (key, value)) in context.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(key);
        out.push('=');
        match value {
            serde_json::Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
    }
    out.push('}');
    out
}

/// Reject `strftime` patterns chrono cannot render.
pub fn validate_timestamp_format(pattern: &str) -> Result<(), AuditError> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(AuditError::invalid_pattern(
            pattern,
            "unsupported strftime specifier",
        ));
    }
    Ok(())
}
