//! A deferred, cancellable timer.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

type Action = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Timer {
    deadline: Option<Instant>,
    action: Option<Action>,
    running: bool,
}

/// Runs at most one pending action after a delay.
///
/// Arming replaces any pending action. A single background thread serves the
/// timer while it is armed and exits once nothing is pending. The action runs
/// on that thread with no lock held, so it may arm the watchdog again.
pub(crate) struct Watchdog {
    name: String,
    shared: Arc<(Mutex<Timer>, Condvar)>,
}

impl Watchdog {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new((Mutex::new(Timer::default()), Condvar::new())),
        }
    }

    pub(crate) fn arm<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let (lock, cvar) = &*self.shared;
        let mut timer = lock_timer(lock);
        timer.deadline = Some(Instant::now() + delay);
        timer.action = Some(Box::new(action));

        if !timer.running {
            let shared = Arc::clone(&self.shared);
            match thread::Builder::new()
                .name(self.name.clone())
                .spawn(move || serve(&shared))
            {
                Ok(_) => timer.running = true,
                Err(e) => {
                    warn!(error = %e, watchdog = %self.name, "failed to spawn watchdog thread");
                    timer.deadline = None;
                    timer.action = None;
                }
            }
        }
        cvar.notify_all();
    }

    /// Push the pending deadline out to `delay` from now. No effect when disarmed.
    pub(crate) fn postpone(&self, delay: Duration) -> bool {
        let (lock, cvar) = &*self.shared;
        let mut timer = lock_timer(lock);
        if timer.deadline.is_none() {
            return false;
        }
        timer.deadline = Some(Instant::now() + delay);
        cvar.notify_all();
        true
    }

    pub(crate) fn cancel(&self) {
        let (lock, cvar) = &*self.shared;
        let mut timer = lock_timer(lock);
        timer.deadline = None;
        timer.action = None;
        cvar.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        lock_timer(&self.shared.0).deadline.is_some()
    }
}

fn lock_timer(lock: &Mutex<Timer>) -> MutexGuard<'_, Timer> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

fn serve(shared: &(Mutex<Timer>, Condvar)) {
    let (lock, cvar) = shared;
    let mut timer = lock_timer(lock);
    loop {
        let Some(deadline) = timer.deadline else {
            timer.running = false;
            return;
        };

        let now = Instant::now();
        if now < deadline {
            timer = cvar
                .wait_timeout(timer, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
            continue;
        }

        timer.deadline = None;
        let action = timer.action.take();
        drop(timer);
        if let Some(action) = action {
            action();
        }
        timer = lock_timer(lock);
    }
}
