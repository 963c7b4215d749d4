use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::format::{EventFormatter, SimpleFormatter};
use crate::sink::AuditSink;
use crate::writer::{format_line, LINE_ENDING};

/// Prints one formatted line per event, by default to standard output.
pub struct ConsoleSink<W = Stdout> {
    out: Mutex<W>,
    formatter: Arc<dyn EventFormatter>,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        Self::with_writer(tokio::io::stdout(), Arc::new(SimpleFormatter::default()))
    }
}

impl<W> ConsoleSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn with_writer(out: W, formatter: Arc<dyn EventFormatter>) -> Self {
        Self {
            out: Mutex::new(out),
            formatter,
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W> AuditSink for ConsoleSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut line = format_line(self.formatter.as_ref(), &event)?;
        line.push_str(LINE_ENDING);

        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes())
            .await
            .map_err(AuditError::Write)?;
        out.flush().await.map_err(AuditError::Flush)
    }
}
