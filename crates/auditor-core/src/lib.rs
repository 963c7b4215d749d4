//! Structured audit events and the sinks that record them.
//!
//! An [`AuditEvent`] captures who did what, when, and from where. Sinks
//! implementing [`AuditSink`] turn events into append-only text lines:
//!
//! * [`AsyncFileSink`] queues events in a bounded channel and writes them
//!   from a single background task, so callers never wait on disk I/O
//!   (only on queue space).
//! * [`FileSink`] writes directly on the caller's task.
//! * [`ConsoleSink`] prints to standard output.
//! * [`FanoutSink`] forwards each event to several sinks.
//!
//! Lines are produced by an [`EventFormatter`]; the default
//! [`SimpleFormatter`] renders
//! `[timestamp] actor? session? origin? - action context? - error?`.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use auditor_core::{AsyncFileSink, AuditEvent};
//!
//! # async fn example() -> Result<(), auditor_core::AuditError> {
//! let sink = AsyncFileSink::builder("/var/log/app/audit.log")
//!     .capacity(256)
//!     .open()
//!     .await?;
//!
//! sink.record(
//!     AuditEvent::new("Login")
//!         .with_actor("alice")
//!         .with_session("5f1c")
//!         .with_origin("10.0.0.7"),
//! )
//! .await?;
//!
//! sink.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod event;
pub mod fanout;
pub mod format;
pub mod observer;
pub mod sink;
pub mod writer;

// Re-export primary public types at the crate root for convenience.
pub use config::{AuditConfig, SinkMode};
pub use console::ConsoleSink;
pub use error::AuditError;
pub use event::{AuditEvent, Severity};
pub use fanout::FanoutSink;
pub use format::{EventFormatter, SimpleFormatter};
pub use observer::{ErrorObserver, TracingObserver};
pub use sink::{AsyncFileSink, AsyncFileSinkBuilder, AuditSink, SinkState};
pub use writer::{AuditWriter, FileSink};
