//! Inactivity watchdog.
//!
//! Detects a stalled scan: the consumer kicks the watchdog on every row it
//! receives, and if no kick arrives for the configured timeout the watchdog
//! fires its done signal, which the scan context translates into
//! [`crate::error::ImportError::ScanTimeout`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::{sleep_until, Instant};

/// One-shot inactivity timer with kick/stop.
///
/// All operations are safe from any thread. A zero timeout makes the
/// watchdog inert: `start` still returns a signal, but it never fires.
#[derive(Clone)]
pub struct Watchdog {
    inner: Arc<Inner>,
}

struct Inner {
    timeout: Duration,
    state: Mutex<State>,
    notify: Notify,
    fired_tx: watch::Sender<bool>,
}

struct State {
    deadline: Instant,
    started: bool,
    stopped: bool,
    fired: bool,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        let (fired_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                timeout,
                state: Mutex::new(State {
                    deadline: Instant::now(),
                    started: false,
                    stopped: false,
                    fired: false,
                }),
                notify: Notify::new(),
                fired_tx,
            }),
        }
    }

    /// Arm the timer and return the done signal, which flips to `true`
    /// exactly once if the watchdog expires. Idempotent: later calls return
    /// a receiver for the same signal without restarting the countdown.
    pub fn start(&self) -> watch::Receiver<bool> {
        let rx = self.inner.fired_tx.subscribe();
        if self.inner.timeout.is_zero() {
            return rx;
        }

        {
            let mut state = self.inner.state.lock().unwrap();
            if state.started {
                return rx;
            }
            state.started = true;
            state.deadline = Instant::now() + self.inner.timeout;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run().await });
        rx
    }

    /// Reset the remaining time to the full timeout. No-op before `start`,
    /// after `stop`, or after the signal has fired.
    pub fn kick(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if !state.started || state.stopped || state.fired {
            return;
        }
        state.deadline = Instant::now() + self.inner.timeout;
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Prevent any further firing. Idempotent.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.fired {
            return;
        }
        state.stopped = true;
        drop(state);
        self.inner.notify.notify_one();
    }
}

impl Inner {
    async fn run(self: Arc<Self>) {
        loop {
            let deadline = {
                let state = self.state.lock().unwrap();
                if state.stopped || state.fired {
                    return;
                }
                state.deadline
            };

            if Instant::now() >= deadline {
                let mut state = self.state.lock().unwrap();
                if state.stopped || state.fired {
                    return;
                }
                // A kick may have landed between the reads.
                if Instant::now() >= state.deadline {
                    state.fired = true;
                    drop(state);
                    let _ = self.fired_tx.send(true);
                    return;
                }
                continue;
            }

            tokio::select! {
                _ = sleep_until(deadline) => {}
                _ = self.notify.notified() => {}
            }
        }
    }
}
