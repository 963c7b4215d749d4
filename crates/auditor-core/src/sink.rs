use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::format::{EventFormatter, SimpleFormatter};
use crate::observer::{ErrorObserver, TracingObserver};
use crate::writer::AuditWriter;

/// Default number of events buffered between producers and the writer task.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Anything that accepts audit events.
///
/// Sinks are interchangeable behind `Arc<dyn AuditSink>`, so callers can
/// swap the console, a file, or the queued file sink without code changes.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one event. Ownership of the event moves into the sink.
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError>;

    /// Release the sink's resources. Later `record` calls may fail.
    async fn close(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle of an [`AsyncFileSink`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Accepting events; the writer task is running.
    Open,
    /// No new events accepted; the writer task is draining its backlog.
    Closing,
    /// File closed and writer task finished.
    Closed,
}

impl SinkState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SinkState::Open,
            1 => SinkState::Closing,
            _ => SinkState::Closed,
        }
    }
}

struct Worker {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), AuditError>>,
}

// ---------------------------------------------------------------------------
// AsyncFileSink
// ---------------------------------------------------------------------------

/// File sink that moves disk I/O off the caller's task.
///
/// Events go into a bounded queue and a single background task formats
/// them and appends them to the file in the order they were enqueued.
/// When the queue is full, [`record`](Self::record) waits for space instead
/// of growing memory or dropping the event.
///
/// ```rust,no_run
/// use auditor_core::{AsyncFileSink, AuditEvent};
///
/// # async fn example() -> Result<(), auditor_core::AuditError> {
/// let sink = AsyncFileSink::open("/var/log/app/audit.log").await?;
/// sink.record(AuditEvent::new("Login").with_actor("alice")).await?;
/// sink.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct AsyncFileSink {
    tx: mpsc::Sender<AuditEvent>,
    state: AtomicU8,
    worker: Mutex<Option<Worker>>,
    capacity: usize,
}

impl AsyncFileSink {
    /// Open `path` with the default formatter, capacity and error observer.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        Self::builder(path).open().await
    }

    pub fn builder(path: impl AsRef<Path>) -> AsyncFileSinkBuilder {
        AsyncFileSinkBuilder::new(path)
    }

    pub fn state(&self) -> SinkState {
        SinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue an event, waiting while the queue is full.
    ///
    /// Returns once the event is queued; it will be written unless the
    /// writer reports a failure for it to the error observer. Dropping the
    /// returned future before it completes leaves the event unqueued.
    pub async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.ensure_open()?;
        self.tx.send(event).await.map_err(|_| AuditError::Closed)
    }

    /// Queue an event from a plain OS thread, blocking it while the queue is
    /// full.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn record_blocking(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.ensure_open()?;
        self.tx.blocking_send(event).map_err(|_| AuditError::Closed)
    }

    /// Queue an event only if there is room right now.
    pub fn try_record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.ensure_open()?;
        self.tx.try_send(event).map_err(|err| match err {
            TrySendError::Full(_) => AuditError::QueueFull,
            TrySendError::Closed(_) => AuditError::Closed,
        })
    }

    /// Queue an event, waiting at most `timeout` for room. On timeout the
    /// event is discarded and [`AuditError::Timeout`] is returned.
    pub async fn record_timeout(
        &self,
        event: AuditEvent,
        timeout: Duration,
    ) -> Result<(), AuditError> {
        self.ensure_open()?;
        self.tx
            .send_timeout(event, timeout)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => AuditError::Timeout(timeout),
                SendTimeoutError::Closed(_) => AuditError::Closed,
            })
    }

    /// Stop accepting events, write out everything already queued, then
    /// close the file.
    ///
    /// Producers still waiting for queue space when shutdown starts receive
    /// [`AuditError::Closed`]. If any event could not be written, the
    /// returned error is [`AuditError::Unwritten`]; each such event was
    /// also handed to the error observer. Calling `close` again after it
    /// completed is a no-op. If a `close` future is dropped before it
    /// completes, the next call resumes waiting for the worker.
    pub async fn close(&self) -> Result<(), AuditError> {
        let mut guard = self.worker.lock().await;
        let Some(worker) = guard.as_mut() else {
            return Ok(());
        };

        self.state.store(SinkState::Closing as u8, Ordering::Release);
        if let Some(shutdown_tx) = worker.shutdown_tx.take() {
            // Fails only if the worker already exited; the join reports why.
            let _ = shutdown_tx.send(());
        }

        let result = match (&mut worker.handle).await {
            Ok(result) => result,
            Err(err) => Err(AuditError::Worker(err.to_string())),
        };

        *guard = None;
        self.state.store(SinkState::Closed as u8, Ordering::Release);
        result
    }

    fn ensure_open(&self) -> Result<(), AuditError> {
        match self.state() {
            SinkState::Open => Ok(()),
            SinkState::Closing | SinkState::Closed => Err(AuditError::Closed),
        }
    }
}

#[async_trait]
impl AuditSink for AsyncFileSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        AsyncFileSink::record(self, event).await
    }

    async fn close(&self) -> Result<(), AuditError> {
        AsyncFileSink::close(self).await
    }
}

/// Configures and opens an [`AsyncFileSink`].
pub struct AsyncFileSinkBuilder {
    path: PathBuf,
    formatter: Arc<dyn EventFormatter>,
    observer: Arc<dyn ErrorObserver>,
    capacity: usize,
}

impl AsyncFileSinkBuilder {
    fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            formatter: Arc::new(SimpleFormatter::default()),
            observer: Arc::new(TracingObserver),
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn formatter(mut self, formatter: Arc<dyn EventFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ErrorObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Open the file and spawn the background writer task.
    ///
    /// Must be called from within a Tokio runtime. Fails without spawning
    /// anything if the file cannot be opened.
    pub async fn open(self) -> Result<AsyncFileSink, AuditError> {
        if self.capacity == 0 {
            return Err(AuditError::InvalidCapacity);
        }

        let writer = AuditWriter::open(&self.path, self.formatter).await?;

        let (tx, rx) = mpsc::channel::<AuditEvent>(self.capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(run_drain_loop(writer, rx, shutdown_rx, self.observer));

        tracing::debug!(
            path = %self.path.display(),
            capacity = self.capacity,
            "audit writer task started"
        );

        Ok(AsyncFileSink {
            tx,
            state: AtomicU8::new(SinkState::Open as u8),
            worker: Mutex::new(Some(Worker {
                shutdown_tx: Some(shutdown_tx),
                handle,
            })),
            capacity: self.capacity,
        })
    }
}

/// Core loop executed inside the background task.
///
/// Writes queued events one at a time, each flushed before the next is
/// taken. Any event that fails to format or write is handed to `observer`.
/// On shutdown (or when the sink is dropped) the queue is closed to new
/// events, the backlog is written, and the file is closed. The result is
/// [`AuditError::Unwritten`] when any event hit an I/O error.
async fn run_drain_loop(
    mut writer: AuditWriter,
    mut rx: mpsc::Receiver<AuditEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    observer: Arc<dyn ErrorObserver>,
) -> Result<(), AuditError> {
    let mut unwritten = 0usize;
    let mut draining = false;

    loop {
        tokio::select! {
            // Fires on an explicit close and when the sink is dropped.
            _ = &mut shutdown_rx, if !draining => {
                rx.close();
                draining = true;
            }
            next = rx.recv() => match next {
                Some(event) => {
                    if let Err(err) = writer.write(&event).await {
                        if matches!(err, AuditError::Write(_) | AuditError::Flush(_)) {
                            unwritten += 1;
                        }
                        observer.on_error(&event, &err);
                    }
                }
                None => break,
            },
        }
    }

    tracing::debug!(
        path = %writer.path().display(),
        unwritten,
        "audit writer task shutting down"
    );
    writer.shutdown().await?;

    if unwritten > 0 {
        return Err(AuditError::Unwritten(unwritten));
    }
    Ok(())
}
