use crate::error::AuditError;
use crate::event::AuditEvent;

/// Receives per-event failures from a sink's background worker.
///
/// The worker keeps going after reporting, so implementations must not
/// block for long.
pub trait ErrorObserver: Send + Sync {
    fn on_error(&self, event: &AuditEvent, error: &AuditError);
}

impl<F> ErrorObserver for F
where
    F: Fn(&AuditEvent, &AuditError) + Send + Sync,
{
    fn on_error(&self, event: &AuditEvent, error: &AuditError) {
        self(event, error)
    }
}

/// Default observer: reports failures through `tracing::error!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ErrorObserver for TracingObserver {
    fn on_error(&self, event: &AuditEvent, error: &AuditError) {
        tracing::error!(
            event_id = %event.id(),
            action = event.action(),
            actor = event.actor(),
            %error,
            "failed to write audit event"
        );
    }
}
