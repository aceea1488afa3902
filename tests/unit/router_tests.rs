//! Unit tests for the outbound line router.
//!
//! The router reads from one half of a [`tokio::io::duplex`] pair; the test
//! plays the engine by writing to the other half.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use natty::engine::codec::MAX_LINE_BYTES;
use natty::engine::router::{classify_record, run_router, Record};
use natty::engine::{Activity, ActivityOutcome, SignalingSink};
use natty::{AppError, FiveTuple, Protocol};

const RESULT_LINE: &str =
    "{\"5-tuple\":true,\"proto\":\"udp\",\"local\":\"10.0.0.1:5000\",\"remote\":\"203.0.113.9:6000\"}\n";

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Harness {
    engine: tokio::io::DuplexStream,
    sent: Arc<Mutex<Vec<Bytes>>>,
    result_rx: oneshot::Receiver<FiveTuple>,
    notice_rx: mpsc::Receiver<ActivityOutcome>,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

fn start_router(max_line_bytes: usize) -> Harness {
    let (engine, stdout) = tokio::io::duplex(64 * 1024);
    let sent = Arc::new(Mutex::new(Vec::new()));
    let sent_by_sink = Arc::clone(&sent);
    let sink: Arc<dyn SignalingSink> = Arc::new(move |msg: Bytes| {
        sent_by_sink.lock().unwrap().push(msg);
    });
    let (result_tx, result_rx) = oneshot::channel();
    let (notice_tx, notice_rx) = mpsc::channel(10);
    let shutdown = CancellationToken::new();

    let task = tokio::spawn(run_router(
        "router-test".into(),
        stdout,
        max_line_bytes,
        sink,
        result_tx,
        notice_tx,
        shutdown.clone(),
    ));

    Harness {
        engine,
        sent,
        result_rx,
        notice_rx,
        shutdown,
        task,
    }
}

async fn finish(task: tokio::task::JoinHandle<()>) {
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("router must stop")
        .expect("router must not panic");
}

// ── classify_record ───────────────────────────────────────────────────────────

#[test]
fn classify_result_record() {
    let record = Bytes::from(RESULT_LINE.trim_end().to_owned());
    match classify_record(record).expect("valid record") {
        Record::Result(tuple) => assert_eq!(tuple.proto, Protocol::Udp),
        Record::Signal(_) => panic!("marker record must be a result"),
    }
}

#[test]
fn classify_signal_record_is_verbatim() {
    let record = Bytes::from_static(b"candidate:1 1 UDP 2122260223 10.0.0.1 5000 typ host");
    let classified = classify_record(record.clone()).expect("signal");
    assert_eq!(classified, Record::Signal(record));
}

#[test]
fn classify_malformed_result_is_decode_error() {
    let err = classify_record(Bytes::from_static(b"{\"5-tuple\":true,\"proto\":")).unwrap_err();
    assert!(matches!(err, AppError::Decode(_)), "got {err:?}");
}

// ── run_router ────────────────────────────────────────────────────────────────

/// Signaling records reach the sink in order and the result ends the router
/// without posting an outcome.
#[tokio::test]
async fn forwards_signals_in_order_then_delivers_result() {
    let mut h = start_router(MAX_LINE_BYTES);

    h.engine
        .write_all(b"offer-sdp\ncandidate:1\ncandidate:2\n")
        .await
        .unwrap();
    h.engine.write_all(RESULT_LINE.as_bytes()).await.unwrap();

    let tuple = h.result_rx.await.expect("result delivered");
    assert_eq!(tuple.local, "10.0.0.1:5000");
    assert_eq!(tuple.remote, "203.0.113.9:6000");

    finish(h.task).await;
    assert_eq!(
        *h.sent.lock().unwrap(),
        vec![
            Bytes::from_static(b"offer-sdp"),
            Bytes::from_static(b"candidate:1"),
            Bytes::from_static(b"candidate:2"),
        ]
    );
    assert!(h.notice_rx.recv().await.is_none(), "no outcome after a result");
}

/// Records after the result are never read.
#[tokio::test]
async fn stops_after_first_result() {
    let mut h = start_router(MAX_LINE_BYTES);

    let burst = format!("{RESULT_LINE}late-candidate\n{RESULT_LINE}");
    h.engine.write_all(burst.as_bytes()).await.unwrap();

    h.result_rx.await.expect("result delivered");
    finish(h.task).await;
    assert!(h.sent.lock().unwrap().is_empty());
}

/// Clean EOF posts a benign outcome and closes the result slot.
#[tokio::test]
async fn eof_posts_benign_outcome() {
    let mut h = start_router(MAX_LINE_BYTES);

    h.engine.write_all(b"candidate:1\n").await.unwrap();
    drop(h.engine);

    let outcome = h.notice_rx.recv().await.expect("outcome posted");
    assert_eq!(outcome.activity, Activity::Router);
    assert!(outcome.result.is_ok(), "EOF must be benign: {:?}", outcome.result);
    assert!(h.result_rx.await.is_err(), "no result on EOF");
    finish(h.task).await;
    assert_eq!(h.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_result_posts_decode_error() {
    let mut h = start_router(MAX_LINE_BYTES);

    h.engine
        .write_all(b"{\"5-tuple\":true,\"proto\":\"sctp\",\"local\":\"a\",\"remote\":\"b\"}\n")
        .await
        .unwrap();

    let outcome = h.notice_rx.recv().await.expect("outcome posted");
    assert!(
        matches!(outcome.result, Err(AppError::Decode(_))),
        "got {:?}",
        outcome.result
    );
    assert!(h.result_rx.await.is_err(), "no result after a decode failure");
    finish(h.task).await;
}

#[tokio::test]
async fn overlong_record_posts_io_error() {
    let mut h = start_router(8);

    h.engine.write_all(b"0123456789abcdef\n").await.unwrap();

    let outcome = h.notice_rx.recv().await.expect("outcome posted");
    assert!(
        matches!(outcome.result, Err(AppError::Io(ref msg)) if msg.starts_with("line too long")),
        "got {:?}",
        outcome.result
    );
    finish(h.task).await;
}

/// Shutdown stops the router without posting anything.
#[tokio::test]
async fn shutdown_stops_silently() {
    let mut h = start_router(MAX_LINE_BYTES);

    h.shutdown.cancel();
    finish(h.task).await;

    assert!(h.notice_rx.recv().await.is_none());
    drop(h.engine);
}
