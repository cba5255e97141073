//! The "report fatal and stop" effect injected into a sink.
//!
//! The sink never terminates the process itself. It hands every runtime
//! failure to a [`FatalHandler`] and stops its worker; what happens next
//! (log, exit, capture in a test) is up to the handler.

use tracing::error;

use crate::error::SinkError;

pub trait FatalHandler: Send + Sync {
    fn on_fatal(&self, err: &SinkError);
}

/// Blanket impl so closures can be used as fatal handlers.
impl<F: Fn(&SinkError) + Send + Sync> FatalHandler for F {
    fn on_fatal(&self, err: &SinkError) {
        self(err)
    }
}

/// Logs the failure and lets the caller decide how to wind down.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFatal;

impl FatalHandler for LogFatal {
    fn on_fatal(&self, err: &SinkError) {
        error!(kind = err.kind(), "textsink: {err}");
    }
}

/// Logs the failure and exits the process with status 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitOnFatal;

impl FatalHandler for ExitOnFatal {
    fn on_fatal(&self, err: &SinkError) {
        error!(kind = err.kind(), "textsink: {err}");
        std::process::exit(1);
    }
}
