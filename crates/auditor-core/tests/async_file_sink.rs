use std::path::Path;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;

use auditor_core::{
    AsyncFileSink, AuditError, AuditEvent, EventFormatter, SimpleFormatter, SinkState,
};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

fn ts() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn event(action: impl Into<String>) -> AuditEvent {
    AuditEvent::new(action).with_timestamp(ts())
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn actions(path: &Path) -> Vec<String> {
    read_lines(path)
        .into_iter()
        .map(|line| {
            line.rsplit_once(" - ")
                .map(|(_, action)| action.to_string())
                .unwrap_or(line)
        })
        .collect()
}

/// Formatter that announces each event and then waits for a release token,
/// which lets a test hold the writer task mid-event.
struct GatedFormatter {
    inner: SimpleFormatter,
    entered: mpsc::UnboundedSender<String>,
    release: Mutex<std_mpsc::Receiver<()>>,
}

impl EventFormatter for GatedFormatter {
    fn format(&self, event: &AuditEvent) -> Result<String, AuditError> {
        let _ = self.entered.send(event.action().to_string());
        let _ = self.release.lock().unwrap().recv();
        self.inner.format(event)
    }
}

fn gated() -> (
    Arc<GatedFormatter>,
    mpsc::UnboundedReceiver<String>,
    std_mpsc::Sender<()>,
) {
    let (entered_tx, entered_rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = std_mpsc::channel();
    let formatter = GatedFormatter {
        inner: SimpleFormatter::default(),
        entered: entered_tx,
        release: Mutex::new(release_rx),
    };
    (Arc::new(formatter), entered_rx, release_tx)
}

/// Fails on "boom" and panics on "panic"; formats everything else.
struct FaultyFormatter;

impl EventFormatter for FaultyFormatter {
    fn format(&self, event: &AuditEvent) -> Result<String, AuditError> {
        match event.action() {
            "boom" => Err(AuditError::Format("refusing to format boom".into())),
            "panic" => panic!("formatter exploded"),
            _ => SimpleFormatter::default().format(event),
        }
    }
}

#[tokio::test]
async fn writes_formatted_lines_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let sink = AsyncFileSink::builder(&path).capacity(8).open().await.unwrap();

    sink.record(
        event("Login")
            .with_actor("alice")
            .with_session("s1")
            .with_origin("127.0.0.1"),
    )
    .await
    .unwrap();
    sink.record(event("Login")).await.unwrap();
    for i in 0..500 {
        sink.record(event(format!("op-{i}"))).await.unwrap();
    }
    sink.close().await.unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 502);
    assert_eq!(lines[0], "[06/01/2024 12:00:00] alice s1 127.0.0.1 - Login");
    assert_eq!(lines[1], "[06/01/2024 12:00:00] - Login");
    for (i, line) in lines[2..].iter().enumerate() {
        assert_eq!(line, &format!("[06/01/2024 12:00:00] - op-{i}"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_keep_per_producer_order() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 200;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let sink = Arc::new(AsyncFileSink::builder(&path).capacity(4).open().await.unwrap());

    let mut handles = Vec::new();
    for p in 0..PRODUCERS {
        let sink = Arc::clone(&sink);
        handles.push(tokio::spawn(async move {
            for n in 0..PER_PRODUCER {
                sink.record(event(format!("p{p}-{n}"))).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    sink.close().await.unwrap();

    let actions = actions(&path);
    assert_eq!(actions.len(), PRODUCERS * PER_PRODUCER);

    for p in 0..PRODUCERS {
        let prefix = format!("p{p}-");
        let seen: Vec<usize> = actions
            .iter()
            .filter_map(|a| a.strip_prefix(&prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(seen, (0..PER_PRODUCER).collect::<Vec<_>>(), "producer {p}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_queue_holds_producers_until_worker_dequeues() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let (formatter, mut entered, release) = gated();
    let sink = Arc::new(
        AsyncFileSink::builder(&path)
            .formatter(formatter)
            .capacity(1)
            .open()
            .await
            .unwrap(),
    );

    // e1 is taken by the writer and held inside the formatter.
    sink.record(event("e1")).await.unwrap();
    assert_eq!(entered.recv().await.unwrap(), "e1");

    // e2 occupies the single queue slot.
    sink.record(event("e2")).await.unwrap();

    assert!(matches!(
        sink.try_record(event("rejected")),
        Err(AuditError::QueueFull)
    ));
    assert!(matches!(
        sink.record_timeout(event("rejected"), Duration::from_millis(20))
            .await,
        Err(AuditError::Timeout(_))
    ));

    let producer = {
        let sink = Arc::clone(&sink);
        tokio::spawn(async move { sink.record(event("e3")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!producer.is_finished(), "record returned while the queue was full");

    // Let e1 and e2 through; dequeuing e2 frees the slot for e3. The writer
    // must not stay parked in the formatter, or the woken producer could be
    // stuck behind it on the same runtime thread.
    release.send(()).unwrap();
    release.send(()).unwrap();
    producer.await.unwrap().unwrap();
    assert_eq!(entered.recv().await.unwrap(), "e2");

    release.send(()).unwrap();
    assert_eq!(entered.recv().await.unwrap(), "e3");
    sink.close().await.unwrap();

    assert_eq!(actions(&path), vec!["e1", "e2", "e3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_event_does_not_stop_later_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");

    let failures = Arc::new(Mutex::new(Vec::new()));
    let observer = {
        let failures = Arc::clone(&failures);
        move |event: &AuditEvent, error: &AuditError| {
            failures
                .lock()
                .unwrap()
                .push((event.action().to_string(), error.to_string()));
        }
    };

    let sink = AsyncFileSink::builder(&path)
        .formatter(Arc::new(FaultyFormatter))
        .observer(Arc::new(observer))
        .open()
        .await
        .unwrap();

    for action in ["a", "b", "boom", "c", "panic", "d", "e"] {
        sink.record(event(action)).await.unwrap();
    }
    sink.close().await.unwrap();

    assert_eq!(actions(&path), vec!["a", "b", "c", "d", "e"]);

    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].0, "boom");
    assert!(failures[0].1.contains("refusing to format boom"));
    assert_eq!(failures[1].0, "panic");
    assert!(failures[1].1.contains("formatter exploded"));
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn io_failures_reach_observer_and_fail_close() {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let observer = {
        let failures = Arc::clone(&failures);
        move |event: &AuditEvent, error: &AuditError| {
            let io = matches!(error, AuditError::Write(_) | AuditError::Flush(_));
            failures
                .lock()
                .unwrap()
                .push((event.action().to_string(), io));
        }
    };

    // Every write to /dev/full fails with ENOSPC.
    let sink = AsyncFileSink::builder("/dev/full")
        .observer(Arc::new(observer))
        .open()
        .await
        .unwrap();

    for action in ["a", "b", "c"] {
        sink.record(event(action)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    for action in ["d", "e"] {
        sink.record(event(action)).await.unwrap();
    }

    let err = sink.close().await.unwrap_err();
    assert!(matches!(err, AuditError::Unwritten(5)), "{err}");
    assert_eq!(sink.state(), SinkState::Closed);

    let failures = failures.lock().unwrap();
    let seen: Vec<&str> = failures.iter().map(|(action, _)| action.as_str()).collect();
    assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
    assert!(failures.iter().all(|(_, io)| *io));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_drains_backlog_and_rejects_new_events() {
    const BACKLOG: usize = 10;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let (formatter, mut entered, release) = gated();
    let sink = Arc::new(
        AsyncFileSink::builder(&path)
            .formatter(formatter)
            .capacity(16)
            .open()
            .await
            .unwrap(),
    );

    for i in 0..BACKLOG {
        sink.record(event(format!("queued-{i}"))).await.unwrap();
    }
    assert_eq!(entered.recv().await.unwrap(), "queued-0");

    let closer = {
        let sink = Arc::clone(&sink);
        tokio::spawn(async move { sink.close().await })
    };
    while sink.state() == SinkState::Open {
        tokio::task::yield_now().await;
    }
    assert!(matches!(
        sink.record(event("during-close")).await,
        Err(AuditError::Closed)
    ));

    for _ in 0..BACKLOG {
        release.send(()).unwrap();
    }
    closer.await.unwrap().unwrap();
    assert_eq!(sink.state(), SinkState::Closed);

    assert!(matches!(
        sink.record(event("after-close")).await,
        Err(AuditError::Closed)
    ));

    let expected: Vec<String> = (0..BACKLOG).map(|i| format!("queued-{i}")).collect();
    assert_eq!(actions(&path), expected);
}

#[tokio::test]
async fn record_after_close_never_touches_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let sink = AsyncFileSink::open(&path).await.unwrap();

    sink.record(event("Login")).await.unwrap();
    sink.close().await.unwrap();
    let before = std::fs::read(&path).unwrap();

    let err = sink.record(event("Logout")).await.unwrap_err();
    assert!(matches!(err, AuditError::Closed));
    assert_eq!(err.to_string(), "audit sink is closed");
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[tokio::test]
async fn appends_to_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    std::fs::write(&path, "earlier run\n").unwrap();

    let sink = AsyncFileSink::open(&path).await.unwrap();
    sink.record(event("Login")).await.unwrap();
    sink.close().await.unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines[0], "earlier run");
    assert_eq!(lines[1], "[06/01/2024 12:00:00] - Login");
}

#[tokio::test]
async fn open_failures_are_reported_synchronously() {
    let dir = tempfile::tempdir().unwrap();

    let result = AsyncFileSink::open(dir.path()).await;
    assert!(matches!(result, Err(AuditError::OpenFile { .. })));

    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    let result = AsyncFileSink::open(blocker.join("audit.log")).await;
    assert!(matches!(result, Err(AuditError::CreateDir { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_producers_on_plain_threads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let sink = Arc::new(AsyncFileSink::builder(&path).capacity(2).open().await.unwrap());

    let thread = {
        let sink = Arc::clone(&sink);
        std::thread::spawn(move || {
            for i in 0..50 {
                sink.record_blocking(event(format!("t-{i}"))).unwrap();
            }
        })
    };
    tokio::task::spawn_blocking(move || thread.join().unwrap())
        .await
        .unwrap();
    sink.close().await.unwrap();

    let expected: Vec<String> = (0..50).map(|i| format!("t-{i}")).collect();
    assert_eq!(actions(&path), expected);
}

#[tokio::test]
async fn dropped_sink_still_drains() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let sink = AsyncFileSink::open(&path).await.unwrap();

    for i in 0..20 {
        sink.record(event(format!("d-{i}"))).await.unwrap();
    }
    drop(sink);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while read_lines(&path).len() < 20 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(read_lines(&path).len(), 20);
}
