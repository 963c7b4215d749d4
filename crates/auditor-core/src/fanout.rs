use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::sink::AuditSink;

/// Records every event into several sinks, e.g. console plus file.
///
/// Sinks are called in order. A failing sink does not stop the event from
/// reaching the remaining ones; the first error is returned afterwards.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl AuditSink for FanoutSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut first_error = None;

        for (index, sink) in self.sinks.iter().enumerate() {
            if let Err(err) = sink.record(event.clone()).await {
                warn!(sink = index, action = event.action(), %err, "audit sink rejected event");
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    async fn close(&self) -> Result<(), AuditError> {
        let mut first_error = None;

        for (index, sink) in self.sinks.iter().enumerate() {
            if let Err(err) = sink.close().await {
                warn!(sink = index, %err, "audit sink failed to close");
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
