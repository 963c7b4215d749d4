use std::sync::Arc;

use async_trait::async_trait;

use auditor_core::format::render_context;
use auditor_core::{AuditError, AuditEvent, AuditSink, Severity};

use crate::context::{AmbientContext, TaskContext, ACTOR_KEY, ORIGIN_KEY, SESSION_KEY};
use crate::pattern::PatternLayout;

/// `tracing` target used for every audit event emitted by [`TracingSink`].
pub const AUDIT_TARGET: &str = "audit";

macro_rules! emit_audit {
    ($level:ident, $logger:expr, $event:expr, $context:expr, $message:expr) => {
        tracing::$level!(
            target: AUDIT_TARGET,
            logger = %$logger,
            event_id = %$event.id(),
            actor = $event.actor(),
            session = $event.session(),
            origin = $event.origin(),
            action = $event.action(),
            context = $context,
            error = $event.error_message(),
            "{}",
            $message
        )
    };
}

/// Sink that hands audit events to whatever `tracing` subscriber is
/// installed, so they reach the same appenders and layers as the rest of
/// the application's logs.
///
/// Before emitting, missing actor, session and origin fields are filled in
/// from the sink's [`AmbientContext`] (by default the task-local
/// [`TaskContext`]). The recorded event therefore may carry values the
/// caller never set.
///
/// Info events are emitted at `INFO`, error events at `ERROR`, on the
/// [`AUDIT_TARGET`] target.
pub struct TracingSink {
    logger: String,
    context: Arc<dyn AmbientContext>,
    layout: Option<PatternLayout>,
}

impl TracingSink {
    pub fn new(logger: impl Into<String>) -> Self {
        Self {
            logger: logger.into(),
            context: Arc::new(TaskContext),
            layout: None,
        }
    }

    /// Read default field values from `context` instead of the task-local
    /// context.
    pub fn with_context(mut self, context: Arc<dyn AmbientContext>) -> Self {
        self.context = context;
        self
    }

    /// Render the message with `layout` instead of using the bare action.
    pub fn with_layout(mut self, layout: PatternLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn logger(&self) -> &str {
        &self.logger
    }

    fn backfill(&self, event: AuditEvent) -> AuditEvent {
        event
            .or_actor(self.context.get(ACTOR_KEY))
            .or_session(self.context.get(SESSION_KEY))
            .or_origin(self.context.get(ORIGIN_KEY))
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(AUDIT_TARGET)
    }
}

#[async_trait]
impl AuditSink for TracingSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let event = self.backfill(event);

        let message = match &self.layout {
            Some(layout) => layout.render(&event)?,
            None => event.action().to_string(),
        };
        let context = (!event.context().is_empty()).then(|| render_context(event.context()));
        let context = context.as_deref();

        match event.severity() {
            Severity::Info => emit_audit!(info, self.logger, event, context, message),
            Severity::Error => emit_audit!(error, self.logger, event, context, message),
        }

        Ok(())
    }
}
