//! Error types for the textsink render pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::completion::CompletionError;

/// Errors produced while decoding one raw frame into a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed record: {reason}")]
    Malformed { reason: String },
}

/// Errors raised by a [`TextOutput`](crate::sink::TextOutput).
///
/// Everything raised after construction is fatal to the worker: it is handed
/// to the [`FatalHandler`](crate::fatal::FatalHandler) and the loop stops.
/// `index` is the zero-based position of the frame in submission order.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Decode failed for frame {index}: {source}")]
    Decode {
        index: u64,
        #[source]
        source: DecodeError,
    },

    #[error("Text format function failed for frame {index}")]
    Format { index: u64 },

    #[error("Write failed for frame {index}: {source}")]
    Write {
        index: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Text finish function failed")]
    Trailer,

    #[error("Trailer write failed: {0}")]
    TrailerWrite(#[source] std::io::Error),

    #[error("Cannot open output '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read config '{}': {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid sink configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Output loop is already running or has already run")]
    LoopAlreadyStarted,

    #[error("Output is already closed")]
    AlreadyClosed,

    #[error("Output loop halted on a fatal error; trailer not written")]
    Halted,

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

impl SinkError {
    /// Returns `true` for errors that only construction can return.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::Open { .. } | Self::Config { .. } | Self::InvalidConfig { .. }
        )
    }

    /// Short machine-friendly label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Format { .. } => "format",
            Self::Write { .. } => "write",
            Self::Trailer => "trailer",
            Self::TrailerWrite(_) => "trailer_write",
            Self::Open { .. } => "open",
            Self::Config { .. } => "config",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::LoopAlreadyStarted => "loop_already_started",
            Self::AlreadyClosed => "already_closed",
            Self::Halted => "halted",
            Self::Completion(_) => "completion",
        }
    }
}

/// Errors from the length-prefixed [`FrameReader`](crate::frame::FrameReader).
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
}
