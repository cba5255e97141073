//! `Completion`: single-fire "the worker has exited" signal.
//!
//! Fires exactly once. Every waiter, including ones that start waiting after
//! the fire, is released. A second fire is rejected with
//! [`CompletionError::AlreadyFired`] rather than silently ignored.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::watch;

/// Misuse of a [`Completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("Completion signal fired more than once")]
    AlreadyFired,
}

#[derive(Debug)]
pub struct Completion {
    fired: AtomicBool,
    tx: watch::Sender<bool>,
}

impl Completion {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            fired: AtomicBool::new(false),
            tx,
        }
    }

    /// Release every waiter. Only the first call succeeds.
    pub fn fire(&self) -> Result<(), CompletionError> {
        if self.fired.swap(true, Ordering::AcqRel) {
            return Err(CompletionError::AlreadyFired);
        }
        self.tx.send_replace(true);
        Ok(())
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Suspend until [`fire`](Self::fire) has been called.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so the only way out is a fire.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}
