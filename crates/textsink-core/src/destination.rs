//! Where rendered text goes: standard output or a file.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWrite;

use crate::error::SinkError;

/// Type-erased writer used by sinks built from a destination name.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    File(PathBuf),
}

impl Destination {
    /// `""` and `"-"` mean standard output; anything else is a file path.
    pub fn parse(name: &str) -> Self {
        match name {
            "" | "-" => Self::Stdout,
            path => Self::File(PathBuf::from(path)),
        }
    }

    /// Open the destination for writing.
    ///
    /// Files are created if missing and truncated if present. Failure is a
    /// construction error, never silently replaced by stdout.
    pub fn open(&self) -> Result<BoxWriter, SinkError> {
        match self {
            Self::Stdout => Ok(Box::new(tokio::io::stdout())),
            Self::File(path) => Ok(Box::new(open_truncate(path)?)),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "<stdout>"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

fn open_truncate(path: &Path) -> Result<tokio::fs::File, SinkError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(tokio::fs::File::from_std(file))
}
