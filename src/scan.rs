//! Cooperative cancellation for row scans.
//!
//! A [`ScanContext`] is the one cancellation signal a producer has to watch.
//! The engine composes it from up to three sources per table scan: the
//! caller's own context, process signals (SIGINT/SIGTERM), and the
//! inactivity watchdog. The reason is carried along so the engine can
//! report the right sentinel error after committing the open batch.

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::ImportError;

/// Why a scan was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Caller cancellation or a delivered SIGINT/SIGTERM.
    Interrupted,
    /// The inactivity watchdog fired.
    TimedOut,
}

impl StopReason {
    pub fn into_error(self) -> ImportError {
        match self {
            StopReason::Interrupted => ImportError::Interrupted,
            StopReason::TimedOut => ImportError::ScanTimeout,
        }
    }
}

/// Cheaply cloneable cancellation handle passed into every producer.
#[derive(Clone)]
pub struct ScanContext {
    stop: watch::Receiver<Option<StopReason>>,
}

/// Owner side of a [`ScanContext`]; cancelling it stops every clone.
pub struct CancelHandle {
    tx: watch::Sender<Option<StopReason>>,
}

impl CancelHandle {
    /// Cancel the scan. Only the first reason wins.
    pub fn cancel(&self, reason: StopReason) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }
}

impl ScanContext {
    /// Create a context together with its cancel handle.
    pub fn new() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(None);
        (Self { stop: rx }, CancelHandle { tx })
    }

    /// A context that is never cancelled.
    pub fn background() -> Self {
        // Receivers treat a dropped sender as "never cancelled".
        let (_tx, rx) = watch::channel(None);
        Self { stop: rx }
    }

    /// Non-blocking check, for producers running in blocking contexts.
    pub fn stop_reason(&self) -> Option<StopReason> {
        *self.stop.borrow()
    }

    /// Resolve once the scan is cancelled. If the owning handle goes away
    /// without cancelling, this pends forever; producers then exit through
    /// the closed row channel instead.
    pub async fn cancelled(&self) -> StopReason {
        let mut rx = self.stop.clone();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Keeps the composition task alive for the duration of one table scan.
///
/// Dropping the guard aborts the task, so a scan that finishes normally
/// does not leave a signal listener behind.
pub struct ScanGuard {
    task: JoinHandle<()>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Compose a per-scan context from the caller's context, process signals,
/// and an optional watchdog done signal.
pub fn compose(
    parent: Option<ScanContext>,
    watchdog_done: Option<watch::Receiver<bool>>,
) -> (ScanContext, ScanGuard) {
    let (ctx, handle) = ScanContext::new();
    let task = tokio::spawn(async move {
        let reason = tokio::select! {
            reason = parent_cancelled(parent) => reason,
            _ = shutdown_signal() => StopReason::Interrupted,
            _ = watchdog_fired(watchdog_done) => StopReason::TimedOut,
        };
        handle.cancel(reason);
    });
    (ctx, ScanGuard { task })
}

async fn parent_cancelled(parent: Option<ScanContext>) -> StopReason {
    match parent {
        Some(ctx) => ctx.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn watchdog_fired(done: Option<watch::Receiver<bool>>) {
    match done {
        Some(mut rx) => {
            if rx.wait_for(|fired| *fired).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}

/// Resolve on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
