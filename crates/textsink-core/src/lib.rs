//! # textsink-core
//!
//! A bounded, asynchronous sink that turns encoded event frames into text.
//!
//! Producers hand raw frames to a [`TextOutput`]; a single output loop
//! decodes each one into a reusable [`Record`], renders it with a
//! caller-supplied [`TextFormatter`], and writes it to a buffered writer,
//! flushing after every frame. Closing the output drains the queue, writes
//! the trailer produced by the [`TextFinisher`], and returns only once the
//! writer is no longer in use.
//!
//! ## Architecture
//! ```text
//! producer ─┐
//! producer ─┼─▶ bounded queue ─▶ output loop ─▶ BufWriter ─▶ file / stdout
//! producer ─┘   (backpressure)   decode+format
//! ```
//!
//! Every failure after construction is fatal: it goes to the injected
//! [`FatalHandler`] and the output loop stops.

pub mod completion;
pub mod config;
pub mod destination;
pub mod error;
pub mod fatal;
pub mod format;
pub mod frame;
pub mod metrics;
pub mod record;
pub mod sink;

pub use completion::{Completion, CompletionError};
pub use config::{SinkConfig, DEFAULT_MAX_FRAME_LEN, DEFAULT_QUEUE_CAPACITY};
pub use destination::{BoxWriter, Destination};
pub use error::{DecodeError, FrameError, SinkError};
pub use fatal::{ExitOnFatal, FatalHandler, LogFatal};
pub use format::{TextFinisher, TextFormatter};
pub use frame::{write_frame, FrameReader};
pub use metrics::SinkMetrics;
pub use record::{JsonRecord, Record};
pub use sink::{Output, SinkState, TextOutput};
