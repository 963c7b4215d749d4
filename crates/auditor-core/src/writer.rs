use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::format::EventFormatter;
use crate::sink::AuditSink;

#[cfg(windows)]
pub(crate) const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub(crate) const LINE_ENDING: &str = "\n";

/// Append-only file writer that turns [`AuditEvent`]s into text lines.
///
/// Each call to [`write`](Self::write) appends exactly one
/// terminator-ended line and flushes it, so an I/O failure is reported
/// against the event that caused it.
pub struct AuditWriter {
    path: PathBuf,
    file: tokio::fs::File,
    formatter: Arc<dyn EventFormatter>,
}

impl AuditWriter {
    /// Open (or create) the audit log file at `path` in append mode.
    ///
    /// Parent directories are created automatically if they do not exist.
    /// Existing content is never truncated.
    pub async fn open(
        path: impl AsRef<Path>,
        formatter: Arc<dyn EventFormatter>,
    ) -> Result<Self, AuditError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| AuditError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| AuditError::OpenFile {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            formatter,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format `event`, append it as a single line and flush.
    pub async fn write(&mut self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut line = format_line(self.formatter.as_ref(), event)?;
        line.push_str(LINE_ENDING);

        self.file
            .write_all(line.as_bytes())
            .await
            .map_err(AuditError::Write)?;
        self.file.flush().await.map_err(AuditError::Flush)
    }

    /// Wait for any in-flight write and close the file.
    pub async fn shutdown(mut self) -> Result<(), AuditError> {
        self.file.shutdown().await.map_err(AuditError::Flush)
    }
}

/// Run the formatter, turning a panic inside it into [`AuditError::Format`]
/// so one bad event cannot take the caller down with it.
pub(crate) fn format_line(
    formatter: &dyn EventFormatter,
    event: &AuditEvent,
) -> Result<String, AuditError> {
    match panic::catch_unwind(AssertUnwindSafe(|| formatter.format(event))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(AuditError::Format(format!("formatter panicked: {reason}")))
        }
    }
}

// ---------------------------------------------------------------------------
// FileSink
// ---------------------------------------------------------------------------

/// Direct, unqueued file sink.
///
/// Every [`record`](AuditSink::record) formats, writes and flushes on the
/// calling task. Concurrent callers are serialised by an internal mutex.
/// See [`AsyncFileSink`](crate::AsyncFileSink) for the queued variant.
pub struct FileSink {
    writer: Mutex<Option<AuditWriter>>,
}

impl FileSink {
    /// Open `path` for append using the given formatter.
    pub async fn open(
        path: impl AsRef<Path>,
        formatter: Arc<dyn EventFormatter>,
    ) -> Result<Self, AuditError> {
        let writer = AuditWriter::open(path, formatter).await?;
        Ok(Self {
            writer: Mutex::new(Some(writer)),
        })
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(AuditError::Closed)?;
        writer.write(&event).await
    }

    async fn close(&self) -> Result<(), AuditError> {
        match self.writer.lock().await.take() {
            Some(writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }
}
