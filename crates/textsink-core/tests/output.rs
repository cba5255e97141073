//! End-to-end behaviour of `TextOutput`: ordering, backpressure, fatal
//! halts, and the close handshake.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use textsink_core::{
    format, JsonRecord, SinkConfig, SinkError, SinkState, TextOutput,
};
use tokio::io::AsyncWrite;

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// In-memory writer whose contents stay readable after the sink owns it.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

impl AsyncWrite for SharedBuf {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Writer that always fails, standing in for a broken destination.
struct BrokenPipe;

impl AsyncWrite for BrokenPipe {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Renders `{"n": ...}` records as `"<n>\n"`.
fn number_line(rec: &JsonRecord) -> Option<Vec<u8>> {
    Some(format!("{}\n", rec.value()["n"]).into_bytes())
}

/// Trailer that only renders against a never-decoded record.
fn end_marker(empty: &JsonRecord) -> Option<Vec<u8>> {
    empty.is_empty().then(|| b"END\n".to_vec())
}

fn frame(n: u64) -> Vec<u8> {
    format!(r#"{{"n":{n}}}"#).into_bytes()
}

type Captured = Arc<Mutex<Vec<String>>>;

fn capturing_output<W>(writer: W, capacity: usize) -> (Arc<TextOutput<JsonRecord, W>>, Captured)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let captured: Captured = Arc::default();
    let sink = Arc::clone(&captured);
    let output = TextOutput::<JsonRecord, _>::with_config(
        writer,
        number_line,
        end_marker,
        &SinkConfig::with_capacity(capacity),
    )
    .unwrap()
    .on_fatal(move |err: &SinkError| sink.lock().unwrap().push(err.to_string()));
    (Arc::new(output), captured)
}

fn expected_lines(range: std::ops::Range<u64>) -> String {
    let mut s: String = range.map(|n| format!("{n}\n")).collect();
    s.push_str("END\n");
    s
}

const STUCK: Duration = Duration::from_secs(5);

// ─── Ordering ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn frames_render_in_order_then_trailer() {
    let buf = SharedBuf::default();
    let (output, fatal) = capturing_output(buf.clone(), 4);
    let worker = output.spawn_output_loop();

    for n in 0..50 {
        output.submit(frame(n)).await;
    }
    output.close().await.unwrap();
    worker.await.unwrap().unwrap();

    assert_eq!(buf.text(), expected_lines(0..50));
    assert!(fatal.lock().unwrap().is_empty());

    let m = output.metrics();
    assert_eq!(m.frames_submitted, 50);
    assert_eq!(m.frames_written, 50);
    assert_eq!(m.bytes_written, buf.len() as u64);
}

#[tokio::test]
async fn close_with_no_frames_writes_only_trailer() {
    let buf = SharedBuf::default();
    let (output, _) = capturing_output(buf.clone(), 2);
    let worker = output.spawn_output_loop();
    output.close().await.unwrap();
    worker.await.unwrap().unwrap();
    assert_eq!(buf.text(), "END\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_keep_their_own_order() {
    let buf = SharedBuf::default();
    let (output, _) = capturing_output(buf.clone(), 3);
    let worker = output.spawn_output_loop();

    let mut producers = Vec::new();
    for p in 0..4u64 {
        let output = Arc::clone(&output);
        producers.push(tokio::spawn(async move {
            for i in 0..25u64 {
                output.submit(frame(p * 1000 + i)).await;
            }
        }));
    }
    for p in producers {
        p.await.unwrap();
    }
    output.close().await.unwrap();
    worker.await.unwrap().unwrap();

    let text = buf.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 101);
    assert_eq!(lines.last(), Some(&"END"));

    for p in 0..4u64 {
        let seen: Vec<u64> = lines[..100]
            .iter()
            .map(|l| l.parse::<u64>().unwrap())
            .filter(|n| n / 1000 == p)
            .collect();
        let want: Vec<u64> = (0..25).map(|i| p * 1000 + i).collect();
        assert_eq!(seen, want, "producer {p} reordered");
    }
}

#[tokio::test]
async fn blocking_producers_on_plain_threads() {
    let buf = SharedBuf::default();
    let (output, _) = capturing_output(buf.clone(), 2);
    let worker = output.spawn_output_loop();

    let producer = Arc::clone(&output);
    tokio::task::spawn_blocking(move || {
        for n in 0..10 {
            producer.blocking_submit(frame(n));
        }
    })
    .await
    .unwrap();

    output.close().await.unwrap();
    worker.await.unwrap().unwrap();
    assert_eq!(buf.text(), expected_lines(0..10));
}

// ─── Backpressure ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_queue_blocks_until_worker_starts() {
    let buf = SharedBuf::default();
    let (output, _) = capturing_output(buf.clone(), 2);

    tokio::time::timeout(Duration::from_millis(100), output.submit(frame(0)))
        .await
        .expect("first submit must not block");
    tokio::time::timeout(Duration::from_millis(100), output.submit(frame(1)))
        .await
        .expect("second submit must not block");

    let third = {
        let output = Arc::clone(&output);
        tokio::spawn(async move { output.submit(frame(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!third.is_finished(), "submit past capacity must wait");
    assert!(buf.text().is_empty());

    let worker = output.spawn_output_loop();
    tokio::time::timeout(STUCK, third).await.expect("third submit stuck").unwrap();

    output.close().await.unwrap();
    worker.await.unwrap().unwrap();
    assert_eq!(buf.text(), expected_lines(0..3));
}

// ─── Fatal errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn decode_failure_halts_without_trailer() {
    let buf = SharedBuf::default();
    let (output, fatal) = capturing_output(buf.clone(), 8);
    let worker = output.spawn_output_loop();

    output.submit(frame(0)).await;
    output.submit(frame(1)).await;
    output.submit(&b"{broken"[..]).await;
    output.submit(frame(3)).await;

    let run = tokio::time::timeout(STUCK, worker).await.expect("worker stuck").unwrap();
    assert!(matches!(run, Err(SinkError::Decode { index: 2, .. })));
    assert!(output.is_halted());

    let closed = tokio::time::timeout(STUCK, output.close()).await.expect("close stuck");
    assert!(matches!(closed, Err(SinkError::Halted)));
    assert_eq!(output.state(), SinkState::Closed);

    assert_eq!(buf.text(), "0\n1\n");
    let fatal = fatal.lock().unwrap();
    assert_eq!(fatal.len(), 1);
    assert!(fatal[0].contains("frame 2"), "{}", fatal[0]);
}

#[tokio::test]
async fn format_failure_halts() {
    let buf = SharedBuf::default();
    let captured: Captured = Arc::default();
    let sink = Arc::clone(&captured);
    let output = Arc::new(
        TextOutput::<JsonRecord, _>::new(
            buf.clone(),
            |rec: &JsonRecord| rec.value()["n"].as_u64().map(|n| format!("{n}\n").into_bytes()),
            format::no_trailer,
        )
        .on_fatal(move |err: &SinkError| sink.lock().unwrap().push(err.kind().to_string())),
    );
    let worker = output.spawn_output_loop();

    output.submit(frame(7)).await;
    output.submit(&br#"{"n":"not a number"}"#[..]).await;

    let run = tokio::time::timeout(STUCK, worker).await.expect("worker stuck").unwrap();
    assert!(matches!(run, Err(SinkError::Format { index: 1 })));
    assert!(matches!(output.close().await, Err(SinkError::Halted)));
    assert_eq!(buf.text(), "7\n");
    assert_eq!(*captured.lock().unwrap(), vec!["format".to_string()]);
}

#[tokio::test]
async fn write_failure_halts_and_close_returns() {
    let (output, fatal) = capturing_output(BrokenPipe, 2);
    let worker = output.spawn_output_loop();

    output.submit(frame(0)).await;

    let run = tokio::time::timeout(STUCK, worker).await.expect("worker stuck").unwrap();
    assert!(matches!(run, Err(SinkError::Write { index: 0, .. })));

    let closed = tokio::time::timeout(STUCK, output.close()).await.expect("close stuck");
    assert!(matches!(closed, Err(SinkError::Halted)));
    assert_eq!(fatal.lock().unwrap().len(), 1);
    assert_eq!(output.metrics().fatal_errors, 1);
}

#[tokio::test]
async fn halted_worker_releases_blocked_producers() {
    let buf = SharedBuf::default();
    let (output, _) = capturing_output(buf.clone(), 1);

    output.submit(&b"not json"[..]).await;
    let mut producers = Vec::new();
    for n in 0..5 {
        let output = Arc::clone(&output);
        producers.push(tokio::spawn(async move { output.submit(frame(n)).await }));
    }

    let worker = output.spawn_output_loop();
    for p in producers {
        tokio::time::timeout(STUCK, p).await.expect("producer stuck").unwrap();
    }
    assert!(worker.await.unwrap().is_err());
    assert!(matches!(output.close().await, Err(SinkError::Halted)));
    assert!(buf.text().is_empty());
    assert!(output.metrics().frames_dropped >= 1);
}

#[tokio::test]
async fn trailer_failure_is_fatal() {
    let buf = SharedBuf::default();
    let captured: Captured = Arc::default();
    let sink = Arc::clone(&captured);
    let output = Arc::new(
        TextOutput::<JsonRecord, _>::new(buf.clone(), number_line, |_: &JsonRecord| -> Option<Vec<u8>> { None })
            .on_fatal(move |err: &SinkError| sink.lock().unwrap().push(err.kind().to_string())),
    );
    let worker = output.spawn_output_loop();

    output.submit(frame(1)).await;
    assert!(matches!(output.close().await, Err(SinkError::Trailer)));
    worker.await.unwrap().unwrap();

    assert_eq!(buf.text(), "1\n");
    assert_eq!(*captured.lock().unwrap(), vec!["trailer".to_string()]);
}

// ─── Close handshake ──────────────────────────────────────────────────────────

#[tokio::test]
async fn nothing_is_written_after_close_returns() {
    let buf = SharedBuf::default();
    let (output, _) = capturing_output(buf.clone(), 4);
    let worker = output.spawn_output_loop();

    for n in 0..20 {
        output.submit(frame(n)).await;
    }
    output.close().await.unwrap();
    let len_at_close = buf.len();
    assert!(buf.text().ends_with("END\n"));

    output.submit(frame(99)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    worker.await.unwrap().unwrap();

    assert_eq!(buf.len(), len_at_close);
    assert_eq!(output.metrics().frames_dropped, 1);
}

#[tokio::test]
async fn second_close_is_rejected() {
    let (output, _) = capturing_output(SharedBuf::default(), 2);
    let worker = output.spawn_output_loop();
    output.close().await.unwrap();
    assert!(matches!(output.close().await, Err(SinkError::AlreadyClosed)));
    worker.await.unwrap().unwrap();
}

// ─── Destinations ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn filename_destination_is_truncated() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("out.yaml");
    std::fs::write(&path, "stale contents that must disappear\n").unwrap();

    let output = Arc::new(
        TextOutput::<JsonRecord, _>::from_filename(
            path.to_str().unwrap(),
            format::yaml_documents,
            format::yaml_end,
            &SinkConfig::default(),
        )
        .unwrap(),
    );
    let worker = output.spawn_output_loop();
    output.submit(&br#"{"qname":"example.com."}"#[..]).await;
    output.submit(&br#"{"qname":"example.net."}"#[..]).await;
    output.close().await.unwrap();
    worker.await.unwrap().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        text,
        "---\nqname: example.com.\n---\nqname: example.net.\n...\n"
    );
}

#[tokio::test]
async fn filename_destination_creates_missing_file() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("fresh.jsonl");

    let output = TextOutput::<JsonRecord, _>::from_filename(
        path.to_str().unwrap(),
        format::json_lines,
        format::no_trailer,
        &SinkConfig::with_capacity(1),
    )
    .unwrap();
    output.submit(&b"[1,2,3]"[..]).await;
    output.close().await.unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1,2,3]\n");
}

#[tokio::test]
async fn unwritable_filename_is_a_construction_error() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("no-such-dir").join("out.txt");

    let err = TextOutput::<JsonRecord, _>::from_filename(
        path.to_str().unwrap(),
        format::json_lines,
        format::no_trailer,
        &SinkConfig::default(),
    )
    .err()
    .expect("open must fail");
    assert!(matches!(err, SinkError::Open { .. }));
    assert!(err.is_construction());
}
