//! Emit audit events through `tracing`.
//!
//! [`TracingSink`] implements [`auditor_core::AuditSink`] by turning each
//! event into a `tracing` event on the `audit` target, so audit records go
//! wherever the application's subscriber sends its logs. Fields the event
//! leaves empty (actor, session, origin) are filled from an injectable
//! [`AmbientContext`], and the message can be shaped with a
//! [`PatternLayout`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//!
//! use auditor_core::{AuditEvent, AuditSink};
//! use auditor_tracing::{context, PatternLayout, TracingSink};
//!
//! # async fn example() -> Result<(), auditor_core::AuditError> {
//! let sink = TracingSink::new("audit")
//!     .with_layout(PatternLayout::new("%-5p %U %S %H %m")?);
//!
//! let values = HashMap::from([("actor".to_string(), "alice".to_string())]);
//! context::scope(values, async {
//!     sink.record(AuditEvent::new("Login")).await
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod bridge;
pub mod context;
pub mod pattern;

pub use bridge::{TracingSink, AUDIT_TARGET};
pub use context::{AmbientContext, NoContext, StaticContext, TaskContext};
pub use pattern::PatternLayout;
