//! A small conversion-pattern engine for audit events.
//!
//! | Pattern | Output |
//! |---|---|
//! | `%d` / `%d{fmt}` | timestamp, chrono `strftime` (default `%Y-%m-%d %H:%M:%S,%3f`) |
//! | `%p` | severity (`INFO` / `ERROR`) |
//! | `%U` | actor |
//! | `%S` | session |
//! | `%H` | origin |
//! | `%m` | action |
//! | `%e` | error message |
//! | `%X{key}` | context value for `key` |
//! | `%n` | line terminator |
//! | `%%` | a literal `%` |
//!
//! Any conversion may carry a `-` (left-justify), a minimum width, and a
//! `.max` width, e.g. `%-10U` or `%.8S`. Values longer than `max` keep
//! their rightmost characters. Missing fields render as empty strings.

use std::fmt::Write as _;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

use auditor_core::format::{render_context, validate_timestamp_format};
use auditor_core::{AuditError, AuditEvent, EventFormatter};

/// Timestamp format used by a bare `%d`.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

const NEWLINE: &str = if cfg!(windows) { "\r\n" } else { "\n" };

#[derive(Debug, Clone, PartialEq, Eq)]
enum Conversion {
    Timestamp(String),
    Severity,
    Actor,
    Session,
    Origin,
    Action,
    ErrorMessage,
    Context(String),
    Newline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Width {
    left_align: bool,
    min: usize,
    max: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Conversion, Width),
}

/// A parsed conversion pattern.
///
/// ```rust
/// use auditor_core::AuditEvent;
/// use auditor_tracing::PatternLayout;
///
/// let layout = PatternLayout::new("%-5p %U %m").unwrap();
/// let line = layout.render(&AuditEvent::new("Login").with_actor("alice")).unwrap();
/// assert_eq!(line, "INFO  alice Login");
/// ```
#[derive(Debug, Clone)]
pub struct PatternLayout {
    pattern: String,
    segments: Vec<Segment>,
}

impl PatternLayout {
    /// Parse `pattern`, rejecting unknown conversions and malformed
    /// modifiers or options.
    pub fn new(pattern: &str) -> Result<Self, AuditError> {
        let segments = Parser::new(pattern).parse()?;
        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn render(&self, event: &AuditEvent) -> Result<String, AuditError> {
        let mut out = String::with_capacity(self.pattern.len() + 64);

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(conversion, width) => {
                    let value = convert(conversion, event)?;
                    push_padded(&mut out, &value, *width);
                }
            }
        }

        Ok(out)
    }
}

impl FromStr for PatternLayout {
    type Err = AuditError;

    fn from_str(pattern: &str) -> Result<Self, Self::Err> {
        Self::new(pattern)
    }
}

impl EventFormatter for PatternLayout {
    fn format(&self, event: &AuditEvent) -> Result<String, AuditError> {
        self.render(event)
    }
}

fn convert(conversion: &Conversion, event: &AuditEvent) -> Result<String, AuditError> {
    let value = match conversion {
        Conversion::Timestamp(format) => {
            let mut out = String::new();
            write!(out, "{}", event.timestamp().format(format))
                .map_err(|_| AuditError::Format("timestamp could not be rendered".into()))?;
            out
        }
        Conversion::Severity => event.severity().to_string(),
        Conversion::Actor => event.actor().unwrap_or_default().to_string(),
        Conversion::Session => event.session().unwrap_or_default().to_string(),
        Conversion::Origin => event.origin().unwrap_or_default().to_string(),
        Conversion::Action => event.action().to_string(),
        Conversion::ErrorMessage => event.error_message().unwrap_or_default().to_string(),
        Conversion::Context(key) => match event.context().get(key) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        },
        Conversion::Newline => NEWLINE.to_string(),
    };
    Ok(value)
}

fn push_padded(out: &mut String, value: &str, width: Width) {
    let mut len = value.chars().count();
    let value = match width.max {
        Some(max) if len > max => {
            let skip = len - max;
            len = max;
            value.chars().skip(skip).collect::<String>()
        }
        _ => value.to_string(),
    };

    let padding = width.min.saturating_sub(len);
    if width.left_align {
        out.push_str(&value);
        out.extend(std::iter::repeat(' ').take(padding));
    } else {
        out.extend(std::iter::repeat(' ').take(padding));
        out.push_str(&value);
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    pattern: &'a str,
    chars: Peekable<Chars<'a>>,
    segments: Vec<Segment>,
    literal: String,
}

impl<'a> Parser<'a> {
    fn new(pattern: &'a str) -> Self {
        Self {
            pattern,
            chars: pattern.chars().peekable(),
            segments: Vec::new(),
            literal: String::new(),
        }
    }

    fn parse(mut self) -> Result<Vec<Segment>, AuditError> {
        while let Some(c) = self.chars.next() {
            if c != '%' {
                self.literal.push(c);
                continue;
            }

            match self.chars.peek() {
                None => return Err(self.error("dangling '%' at end of pattern")),
                Some('%') => {
                    self.chars.next();
                    self.literal.push('%');
                }
                Some(_) => {
                    let field = self.conversion()?;
                    self.flush_literal();
                    self.segments.push(field);
                }
            }
        }

        self.flush_literal();
        Ok(self.segments)
    }

    fn conversion(&mut self) -> Result<Segment, AuditError> {
        let mut width = Width::default();

        if self.chars.next_if_eq(&'-').is_some() {
            width.left_align = true;
        }
        width.min = self.number()?.unwrap_or(0);
        if self.chars.next_if_eq(&'.').is_some() {
            width.max = Some(
                self.number()?
                    .ok_or_else(|| self.error("expected digits after '.'"))?,
            );
        }

        let conversion = match self.chars.next() {
            None => return Err(self.error("missing conversion character")),
            Some('d') => {
                let format = self
                    .option()?
                    .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
                validate_timestamp_format(&format)?;
                Conversion::Timestamp(format)
            }
            Some('X') => {
                let key = self
                    .option()?
                    .filter(|key| !key.is_empty())
                    .ok_or_else(|| self.error("%X requires a key, e.g. %X{request_id}"))?;
                Conversion::Context(key)
            }
            Some('p') => Conversion::Severity,
            Some('U') => Conversion::Actor,
            Some('S') => Conversion::Session,
            Some('H') => Conversion::Origin,
            Some('m') => Conversion::Action,
            Some('e') => Conversion::ErrorMessage,
            Some('n') => Conversion::Newline,
            Some(other) => {
                return Err(self.error(format!("unknown conversion character '{other}'")))
            }
        };

        Ok(Segment::Field(conversion, width))
    }

    /// Read a `{...}` option if one follows.
    fn option(&mut self) -> Result<Option<String>, AuditError> {
        if self.chars.next_if_eq(&'{').is_none() {
            return Ok(None);
        }

        let mut option = String::new();
        for c in self.chars.by_ref() {
            if c == '}' {
                return Ok(Some(option));
            }
            option.push(c);
        }
        Err(self.error("unterminated '{' option"))
    }

    fn number(&mut self) -> Result<Option<usize>, AuditError> {
        let mut value: Option<usize> = None;
        while let Some(digit) = self.chars.peek().and_then(|c| c.to_digit(10)) {
            self.chars.next();
            value = Some(
                value
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit as usize))
                    .ok_or_else(|| self.error("width is too large"))?,
            );
        }
        Ok(value)
    }

    fn flush_literal(&mut self) {
        if !self.literal.is_empty() {
            self.segments
                .push(Segment::Literal(std::mem::take(&mut self.literal)));
        }
    }

    fn error(&self, reason: impl Into<String>) -> AuditError {
        AuditError::invalid_pattern(self.pattern, reason)
    }
}
