//! Quiet-period detection

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use trellis_core::PassToken;

#[derive(Debug)]
struct IdleState {
    last_activity: Instant,
    fast_track: bool,
}

/// Reports when no activity was recorded for `quiet`.
#[derive(Debug)]
pub struct IdleTimer {
    quiet: Duration,
    state: Mutex<IdleState>,
    notify: Notify,
}

impl IdleTimer {
    pub fn new(quiet: Duration) -> Self {
        IdleTimer {
            quiet,
            state: Mutex::new(IdleState {
                last_activity: Instant::now(),
                fast_track: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Record activity, restarting the quiet period.
    pub fn touch(&self) {
        self.state.lock().last_activity = Instant::now();
        self.notify.notify_waiters();
    }

    /// Let the next wait finish immediately.
    pub fn fast_track(&self) {
        self.state.lock().fast_track = true;
        self.notify.notify_waiters();
    }

    /// Wait for the quiet period. Returns `false` if `token` was cancelled
    /// first.
    pub async fn wait(&self, token: &PassToken) -> bool {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let deadline = {
                let mut state = self.state.lock();
                if state.fast_track {
                    state.fast_track = false;
                    return !token.is_cancelled();
                }
                state.last_activity + self.quiet
            };
            if token.is_cancelled() {
                return false;
            }
            if Instant::now() >= deadline {
                return true;
            }

            tokio::select! {
                _ = token.cancelled() => return false,
                _ = sleep_until(deadline) => {}
                _ = &mut notified => {}
            }
        }
    }
}
