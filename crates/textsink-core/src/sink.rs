//! `TextOutput`: bounded queue, single render worker, two-phase close.
//!
//! ```text
//! producers ──submit──▶ mpsc (capacity N) ──▶ output loop
//!                                               decode ▶ format ▶ write ▶ flush
//! close(): close queue ▶ wait for loop exit ▶ trailer ▶ flush ▶ release writer
//! ```
//!
//! The writer and the live record belong to the output loop. When the loop
//! exits it hands the writer back and fires the completion signal; `close`
//! only touches the writer after that, so nothing guards it with a lock.
//! If the loop state is dropped without finishing (a panicking formatter,
//! an aborted task) its `ExitGuard` still fires the signal and marks the
//! sink halted, so `close` always returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::completion::{Completion, CompletionError};
use crate::config::SinkConfig;
use crate::destination::{BoxWriter, Destination};
use crate::error::SinkError;
use crate::fatal::{FatalHandler, LogFatal};
use crate::format::{TextFinisher, TextFormatter};
use crate::metrics::{MetricsCell, SinkMetrics};
use crate::record::Record;

/// Lifecycle of a sink. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Accepting frames.
    Open,
    /// `close` is waiting for the output loop to drain.
    Draining,
    /// Trailer written (or skipped after a fatal error) and writer released.
    Closed,
}

impl std::fmt::Display for SinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Draining => write!(f, "draining"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Object-safe view of an output, so callers can hold `Arc<dyn Output>`.
#[async_trait]
pub trait Output: Send + Sync {
    /// Queue one raw frame, waiting while the queue is full.
    async fn submit(&self, frame: Bytes);

    /// Drive the render loop until the queue is closed and drained, or a
    /// fatal error stops it.
    async fn run_output_loop(&self) -> Result<(), SinkError>;

    /// Drain, write the trailer, flush, and release the writer.
    async fn close(&self) -> Result<(), SinkError>;
}

/// State owned by the output loop while it runs.
struct OutputLoop<R, W> {
    rx: mpsc::Receiver<Bytes>,
    writer: BufWriter<W>,
    record: R,
    exit: ExitGuard,
}

/// Exit state shared between a sink and its output loop.
#[derive(Default)]
struct LoopSignal {
    done: Completion,
    halted: AtomicBool,
}

/// Travels with the loop state. Dropping it before [`complete`](Self::complete)
/// marks the sink halted and fires the completion signal.
struct ExitGuard {
    signal: Arc<LoopSignal>,
    armed: bool,
}

impl ExitGuard {
    fn complete(mut self) -> Result<(), CompletionError> {
        self.armed = false;
        self.signal.done.fire()
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        error!("textsink: output loop dropped before finishing; treating as halted");
        self.signal.halted.store(true, Ordering::Release);
        // Only fails if the signal already fired, which is all we need.
        let _ = self.signal.done.fire();
    }
}

/// What the output loop hands back to `close` on exit.
struct LoopExit<W> {
    writer: BufWriter<W>,
    halted: bool,
}

/// A bounded, single-consumer sink that renders raw frames as text.
///
/// # Usage
/// ```no_run
/// # async fn example() -> Result<(), textsink_core::SinkError> {
/// use std::sync::Arc;
/// use textsink_core::{format, JsonRecord, TextOutput};
///
/// let output = Arc::new(TextOutput::<JsonRecord, _>::new(
///     tokio::io::stdout(),
///     format::json_lines,
///     format::no_trailer,
/// ));
/// let worker = output.spawn_output_loop();
/// output.submit(&br#"{"qname":"example.com."}"#[..]).await;
/// output.close().await?;
/// # let _ = worker.await;
/// # Ok(())
/// # }
/// ```
pub struct TextOutput<R, W> {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    worker: Mutex<Option<OutputLoop<R, W>>>,
    exit: Mutex<Option<LoopExit<W>>>,
    format: Box<dyn TextFormatter<R>>,
    finish: Box<dyn TextFinisher<R>>,
    fatal: Arc<dyn FatalHandler>,
    signal: Arc<LoopSignal>,
    state: Mutex<SinkState>,
    metrics: MetricsCell,
    capacity: usize,
}

impl<R, W> TextOutput<R, W>
where
    R: Record,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Create a sink with the default configuration and [`LogFatal`].
    pub fn new(
        writer: W,
        format: impl TextFormatter<R> + 'static,
        finish: impl TextFinisher<R> + 'static,
    ) -> Self {
        Self::build(
            writer,
            Box::new(format),
            Box::new(finish),
            SinkConfig::default().queue_capacity,
        )
    }

    /// Create a sink with an explicit configuration.
    pub fn with_config(
        writer: W,
        format: impl TextFormatter<R> + 'static,
        finish: impl TextFinisher<R> + 'static,
        config: &SinkConfig,
    ) -> Result<Self, SinkError> {
        config.validate()?;
        Ok(Self::build(
            writer,
            Box::new(format),
            Box::new(finish),
            config.queue_capacity,
        ))
    }

    fn build(
        writer: W,
        format: Box<dyn TextFormatter<R>>,
        finish: Box<dyn TextFinisher<R>>,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let signal = Arc::new(LoopSignal::default());
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(OutputLoop {
                rx,
                writer: BufWriter::new(writer),
                record: R::default(),
                exit: ExitGuard {
                    signal: Arc::clone(&signal),
                    armed: true,
                },
            })),
            exit: Mutex::new(None),
            format,
            finish,
            fatal: Arc::new(LogFatal),
            signal,
            state: Mutex::new(SinkState::Open),
            metrics: MetricsCell::default(),
            capacity,
        }
    }

    /// Replace the fatal-error handler. Call before the sink is shared.
    pub fn on_fatal(mut self, handler: impl FatalHandler + 'static) -> Self {
        self.fatal = Arc::new(handler);
        self
    }

    /// Queue one raw frame, suspending while the queue is at capacity.
    ///
    /// Frames submitted after [`close`](Self::close), or after the output
    /// loop halted on a fatal error, are discarded with a warning. That is a
    /// caller error, not a delivery guarantee.
    pub async fn submit(&self, frame: impl Into<Bytes>) {
        let frame = frame.into();
        let Some(tx) = self.sender() else {
            self.discard(frame.len(), "output closed");
            return;
        };
        match tx.send(frame).await {
            Ok(()) => self.metrics.update(|m| m.frames_submitted += 1),
            Err(mpsc::error::SendError(frame)) => self.discard(frame.len(), "output loop stopped"),
        }
    }

    /// [`submit`](Self::submit) for producers running on plain threads.
    ///
    /// # Panics
    /// Panics if called from within an async execution context, like
    /// [`mpsc::Sender::blocking_send`].
    pub fn blocking_submit(&self, frame: impl Into<Bytes>) {
        let frame = frame.into();
        let Some(tx) = self.sender() else {
            self.discard(frame.len(), "output closed");
            return;
        };
        match tx.blocking_send(frame) {
            Ok(()) => self.metrics.update(|m| m.frames_submitted += 1),
            Err(mpsc::error::SendError(frame)) => self.discard(frame.len(), "output loop stopped"),
        }
    }

    /// Run the render loop on the calling task.
    ///
    /// Exactly one caller may run it; later calls return
    /// [`SinkError::LoopAlreadyStarted`]. Returns once the queue is closed
    /// and drained, or with the first fatal error. Either way the
    /// completion signal fires before this returns.
    pub async fn run_output_loop(&self) -> Result<(), SinkError> {
        let worker = self.take_worker()?;
        self.drive(worker).await
    }

    fn take_worker(&self) -> Result<OutputLoop<R, W>, SinkError> {
        lock(&self.worker).take().ok_or(SinkError::LoopAlreadyStarted)
    }

    async fn drive(&self, mut worker: OutputLoop<R, W>) -> Result<(), SinkError> {
        info!(capacity = self.capacity, "textsink: output loop started");

        let outcome = worker.drain(self.format.as_ref(), &self.metrics).await;

        // Dropping the receiver releases producers parked on a full queue.
        let OutputLoop { rx, writer, exit, .. } = worker;
        drop(rx);

        let halted = outcome.is_err();
        match &outcome {
            Ok(frames) => info!(frames, "textsink: output loop drained"),
            Err(err) => {
                self.signal.halted.store(true, Ordering::Release);
                self.metrics.update(|m| m.fatal_errors += 1);
                self.fatal.on_fatal(err);
            }
        }

        *lock(&self.exit) = Some(LoopExit { writer, halted });
        exit.complete()?;
        outcome.map(|_| ())
    }

    /// Close the queue, wait for the output loop to exit, then write the
    /// trailer and flush.
    ///
    /// Returns only after the output loop has stopped and the writer has
    /// been released, so the destination can be finalised right after. If
    /// the loop halted on a fatal error the trailer is skipped and
    /// [`SinkError::Halted`] is returned. Closing twice returns
    /// [`SinkError::AlreadyClosed`].
    pub async fn close(&self) -> Result<(), SinkError> {
        {
            let mut state = lock(&self.state);
            if *state != SinkState::Open {
                return Err(SinkError::AlreadyClosed);
            }
            *state = SinkState::Draining;
        }
        debug!("textsink: closing queue");
        lock(&self.tx).take();

        let unclaimed = lock(&self.worker).take();
        if let Some(worker) = unclaimed {
            warn!("textsink: close called before the output loop ran; draining inline");
            // Fatal errors were already reported to the handler.
            let _ = self.drive(worker).await;
        }

        self.signal.done.wait().await;

        let exit = lock(&self.exit).take();
        let result = match exit {
            Some(LoopExit {
                writer,
                halted: false,
            }) => self.write_trailer(writer).await,
            Some(LoopExit { halted: true, .. }) | None => {
                warn!("textsink: output loop halted; skipping trailer");
                Err(SinkError::Halted)
            }
        };

        *lock(&self.state) = SinkState::Closed;
        info!(metrics = ?self.metrics(), "textsink: closed");
        result
    }

    /// Spawn [`run_output_loop`](Self::run_output_loop) on the tokio runtime.
    ///
    /// The loop state is claimed before this returns, so a `close` that runs
    /// ahead of the new task still waits for it instead of draining inline.
    pub fn spawn_output_loop(self: &Arc<Self>) -> JoinHandle<Result<(), SinkError>> {
        let output = Arc::clone(self);
        match self.take_worker() {
            Ok(worker) => tokio::spawn(async move { output.drive(worker).await }),
            Err(err) => tokio::spawn(async move { Err(err) }),
        }
    }

    pub fn state(&self) -> SinkState {
        *lock(&self.state)
    }

    /// `true` once the output loop has stopped on a fatal error.
    pub fn is_halted(&self) -> bool {
        self.signal.halted.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a snapshot of current metrics.
    pub fn metrics(&self) -> SinkMetrics {
        self.metrics.snapshot()
    }

    async fn write_trailer(&self, mut writer: BufWriter<W>) -> Result<(), SinkError> {
        let empty = R::default();
        let Some(trailer) = self.finish.finish(&empty) else {
            return self.fail(SinkError::Trailer);
        };
        if let Err(e) = writer.write_all(&trailer).await {
            return self.fail(SinkError::TrailerWrite(e));
        }
        if let Err(e) = writer.flush().await {
            return self.fail(SinkError::TrailerWrite(e));
        }
        self.metrics.update(|m| m.bytes_written += trailer.len() as u64);
        debug!(bytes = trailer.len(), "textsink: trailer written");
        Ok(())
    }

    fn fail(&self, err: SinkError) -> Result<(), SinkError> {
        self.metrics.update(|m| m.fatal_errors += 1);
        self.fatal.on_fatal(&err);
        Err(err)
    }

    fn sender(&self) -> Option<mpsc::Sender<Bytes>> {
        lock(&self.tx).clone()
    }

    fn discard(&self, len: usize, reason: &'static str) {
        self.metrics.update(|m| m.frames_dropped += 1);
        warn!(len, reason, "textsink: frame discarded");
    }
}

impl<R: Record> TextOutput<R, BoxWriter> {
    /// Create a sink writing to a named destination.
    ///
    /// `""` and `"-"` select standard output. Any other name is created or
    /// truncated; failure to open it is returned as [`SinkError::Open`].
    pub fn from_filename(
        name: &str,
        format: impl TextFormatter<R> + 'static,
        finish: impl TextFinisher<R> + 'static,
        config: &SinkConfig,
    ) -> Result<Self, SinkError> {
        config.validate()?;
        let destination = Destination::parse(name);
        let writer = destination.open()?;
        info!(%destination, "textsink: output opened");
        Self::with_config(writer, format, finish, config)
    }
}

impl<R, W> OutputLoop<R, W>
where
    R: Record,
    W: AsyncWrite + Unpin + Send,
{
    /// Render frames until the queue closes. Returns the frame count.
    async fn drain(
        &mut self,
        format: &dyn TextFormatter<R>,
        metrics: &MetricsCell,
    ) -> Result<u64, SinkError> {
        let mut index = 0u64;
        while let Some(frame) = self.rx.recv().await {
            self.record
                .decode_in_place(&frame)
                .map_err(|source| SinkError::Decode { index, source })?;

            let text = format
                .format(&self.record)
                .ok_or(SinkError::Format { index })?;

            self.writer
                .write_all(&text)
                .await
                .map_err(|source| SinkError::Write { index, source })?;
            self.writer
                .flush()
                .await
                .map_err(|source| SinkError::Write { index, source })?;

            metrics.update(|m| {
                m.frames_written += 1;
                m.bytes_written += text.len() as u64;
            });
            debug!(index, bytes = text.len(), "textsink: frame written");
            index += 1;
        }
        Ok(index)
    }
}

#[async_trait]
impl<R, W> Output for TextOutput<R, W>
where
    R: Record,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn submit(&self, frame: Bytes) {
        TextOutput::submit(self, frame).await
    }

    async fn run_output_loop(&self) -> Result<(), SinkError> {
        TextOutput::run_output_loop(self).await
    }

    async fn close(&self) -> Result<(), SinkError> {
        TextOutput::close(self).await
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
