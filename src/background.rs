//! Background Worker
//!
//! One named thread that flushes frozen memtables and checks level budgets
//! on a fixed interval.
//!
//! ```text
//!   flush request ──┐
//!   tick(interval) ─┼──► select! ──► flush frozen memtable ──► compact
//!   shutdown ───────┘        │
//!                            └──► exit (after the current pass)
//! ```
//!
//! Failures never reach request callers. They are logged and recorded in
//! [`CompactionStatus`]; the next tick retries.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::engine::EngineCore;
use crate::error::Result;

/// Outcome counters of background work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStatus {
    /// Background passes that ran at least one compaction
    pub passes: u64,
    /// Level compactions completed
    pub compactions: u64,
    /// Compaction passes that failed
    pub failures: u64,
    /// Freezes and background flushes that failed
    pub flush_failures: u64,
    pub last_error: Option<String>,
}

/// Handle to the background thread
pub(crate) struct BackgroundWorker {
    flush_tx: Sender<()>,
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    pub(crate) fn spawn(core: Arc<EngineCore>) -> Result<Self> {
        // One pending request is enough; the pass flushes whatever is frozen
        let (flush_tx, flush_rx) = channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = channel::bounded(1);

        let handle = thread::Builder::new()
            .name("tierkv-background".to_string())
            .spawn(move || run(core, flush_rx, shutdown_rx))?;

        Ok(Self {
            flush_tx,
            shutdown_tx,
            handle: Some(handle),
        })
    }

    /// Ask for a flush pass without waiting for it
    pub(crate) fn request_flush(&self) {
        match self.flush_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                tracing::warn!("Background worker is gone; flush request dropped")
            }
        }
    }

    /// Signal the thread and wait for its current pass to end
    pub(crate) fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Background worker panicked");
            }
        }
    }
}

fn run(core: Arc<EngineCore>, flush_rx: Receiver<()>, shutdown_rx: Receiver<()>) {
    let ticker = channel::tick(core.check_interval());
    tracing::debug!(interval = ?core.check_interval(), "Background worker started");

    loop {
        crossbeam::select! {
            recv(shutdown_rx) -> _ => break,
            recv(flush_rx) -> msg => {
                if msg.is_err() {
                    break;
                }
                core.background_pass();
            }
            recv(ticker) -> _ => core.background_pass(),
        }
    }

    tracing::debug!("Background worker stopped");
}
