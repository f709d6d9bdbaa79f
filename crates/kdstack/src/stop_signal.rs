use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Armed,
    StopRequested,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    condvar: Condvar,
}

/// One-shot stop request from a controller to a background worker.
///
/// Clones share the same signal. The worker polls between units of work;
/// nothing is interrupted mid-work. A signal cannot be re-armed, so each
/// worker lifetime needs a fresh one.
#[derive(Clone, Debug)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Armed),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Non-blocking poll.
    pub fn stop_requested(&self) -> bool {
        *self.lock() == State::StopRequested
    }

    /// Requests the worker to stop.
    ///
    /// # Panics
    ///
    /// Panics if stop was already requested.
    pub fn stop(&self) {
        let mut state = self.lock();
        if *state == State::StopRequested {
            panic!("[kdstack FATAL] stop: Stop was already requested.");
        }
        *state = State::StopRequested;
        self.inner.condvar.notify_all();
    }

    /// Blocks for up to `timeout`, returning early once stop is requested.
    /// Returns whether stop was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while *state == State::Armed {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.inner.condvar.wait_timeout(state, deadline - now) {
                Ok((state, _)) => state,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
