// ── Per-owner timer arena ──
//
// Every component that schedules delayed work owns one `TimerSet` and calls
// `cancel_all` from its teardown path. Cancelling swaps in a fresh token, so
// the set is reusable after a stop/start cycle.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct TimerState {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Cancellable timers and timer-driven tasks owned by one component.
pub struct TimerSet {
    state: Mutex<TimerState>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TimerState {
                token: CancellationToken::new(),
                handles: Vec::new(),
            }),
        }
    }

    /// Run `task` after `delay`, unless the set is cancelled first.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }

    /// Spawn a task that is torn down by [`cancel_all`](Self::cancel_all).
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.lock();
        state.handles.retain(|h| !h.is_finished());
        let token = state.token.clone();
        state.handles.push(tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = task => {}
            }
        }));
    }

    /// Sleep for `delay`. Returns `false` if the set was cancelled first.
    pub async fn sleep(&self, delay: Duration) -> bool {
        let token = self.token();
        tokio::select! {
            biased;
            () = token.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Token cancelled by the next [`cancel_all`](Self::cancel_all).
    pub fn token(&self) -> CancellationToken {
        self.lock().token.clone()
    }

    /// Cancel every pending timer and task.
    pub fn cancel_all(&self) {
        let mut state = self.lock();
        state.token.cancel();
        for handle in state.handles.drain(..) {
            handle.abort();
        }
        state.token = CancellationToken::new();
    }

    /// Number of timers or tasks still running.
    pub fn pending(&self) -> usize {
        let mut state = self.lock();
        state.handles.retain(|h| !h.is_finished());
        state.handles.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.token.cancel();
        for handle in state.handles.drain(..) {
            handle.abort();
        }
    }
}
