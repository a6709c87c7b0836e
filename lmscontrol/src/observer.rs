//! Named, self-rescheduling polling tasks.
//!
//! Every observer is one Tokio task running `run → sleep → run → ...`. The
//! interval starts only after a cycle has completed, so a slow response
//! pushes the next poll back instead of overlapping it. A cycle may return
//! a different next delay, and other components may re-arm a sleeping
//! observer at any time through its [`Observer`] handle; a re-arm never
//! interrupts a running cycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Body of an observer.
///
/// Failures are the task's own business: a cycle always completes, and the
/// scheduler re-arms the observer whatever happened. The returned delay
/// replaces the regular interval for the next sleep only; `None` keeps the
/// interval. A re-arm requested through [`Observer::delay`] while the cycle
/// ran wins over both.
#[async_trait]
pub trait ObserverTask: Send + Sync + 'static {
    async fn run(&self, observer: &Observer) -> Option<Duration>;
}

/// Handle on a registered observer.
#[derive(Debug)]
pub struct Observer {
    name: String,
    timeout: Mutex<Duration>,
    rearm: Mutex<Option<Duration>>,
    wake: Notify,
    cycles: AtomicU64,
}

impl Observer {
    fn new(name: &str, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            timeout: Mutex::new(timeout),
            rearm: Mutex::new(None),
            wake: Notify::new(),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Regular interval between two cycles.
    pub fn timeout(&self) -> Duration {
        *self.timeout.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock().unwrap_or_else(PoisonError::into_inner) = timeout;
    }

    /// Schedules the next cycle `delay` from now.
    ///
    /// Called during a cycle, it replaces the regular interval once. Called
    /// while the observer sleeps, it restarts the pending timer.
    pub fn delay(&self, delay: Duration) {
        *self.rearm.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
        self.wake.notify_one();
    }

    /// Runs the next cycle as soon as possible.
    pub fn fire_now(&self) {
        self.delay(Duration::ZERO);
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    fn take_rearm(&self) -> Option<Duration> {
        self.rearm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Fields of an observer that can be changed after registration.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObserverPatch {
    pub timeout: Option<Duration>,
}

/// Owns every observer of a controller.
///
/// Observers are registered once and live until [`shutdown`](Self::shutdown);
/// they can be retimed but never removed.
#[derive(Debug)]
pub struct ObserverScheduler {
    observers: Mutex<HashMap<String, Arc<Observer>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Default for ObserverScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverScheduler {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            handles: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Registers an observer and runs its first cycle immediately.
    ///
    /// Must be called from within a Tokio runtime. Registering a name twice
    /// returns the existing observer and leaves `task` unused.
    pub fn add_observer(
        &self,
        name: &str,
        timeout: Duration,
        task: Arc<dyn ObserverTask>,
    ) -> Arc<Observer> {
        let mut observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = observers.get(name) {
            warn!(observer = name, "Observer already registered");
            return existing.clone();
        }

        let observer = Arc::new(Observer::new(name, timeout));
        observers.insert(name.to_string(), observer.clone());
        drop(observers);

        info!(observer = name, timeout_ms = timeout.as_millis() as u64, "Observer registered");

        let handle = tokio::spawn(observer_loop(
            observer.clone(),
            task,
            self.cancel.child_token(),
        ));
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);

        observer
    }

    pub fn get(&self, name: &str) -> Option<Arc<Observer>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Merges `patch` into the named observer; returns false for an unknown name.
    pub fn update_observer(&self, name: &str, patch: ObserverPatch) -> bool {
        let Some(observer) = self.get(name) else {
            return false;
        };
        if let Some(timeout) = patch.timeout {
            debug!(observer = name, timeout_ms = timeout.as_millis() as u64, "Observer retimed");
            observer.set_timeout(timeout);
        }
        true
    }

    /// Re-arms the named observer `delay` from now.
    pub fn delay(&self, name: &str, delay: Duration) -> bool {
        match self.get(name) {
            Some(observer) => {
                observer.delay(delay);
                true
            }
            None => false,
        }
    }

    /// Force-fires every observer.
    pub fn fire_all(&self) {
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for observer in observers.values() {
            observer.fire_now();
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Cancels every pending timer. A cycle already running completes first.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!("Observer scheduler shutting down");
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits until every observer task has exited. Call after [`shutdown`](Self::shutdown).
    pub async fn join(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Drop for ObserverScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn observer_loop(
    observer: Arc<Observer>,
    task: Arc<dyn ObserverTask>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let requested = task.run(&observer).await;
        observer.cycles.fetch_add(1, Ordering::SeqCst);

        let delay = observer
            .take_rearm()
            .or(requested)
            .unwrap_or_else(|| observer.timeout());
        let mut deadline = Instant::now() + delay;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(observer = observer.name(), "Observer stopped");
                    return;
                }
                _ = sleep_until(deadline) => break,
                _ = observer.wake.notified() => {
                    if let Some(delay) = observer.take_rearm() {
                        deadline = Instant::now() + delay;
                    }
                }
            }
        }
    }

    debug!(observer = observer.name(), "Observer stopped");
}
