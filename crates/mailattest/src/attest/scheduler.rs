//! Per-account watch registry.
//!
//! Each watched account gets one tokio task that fires a near-term check
//! after `initial_delay` and then a recurring check every `poll_interval`
//! (measured from the moment watching started). Restarting a watch replaces
//! the previous one. Stop requests are observed between checks only, so a
//! check that is already running always completes.
//!
//! The registry also hands out one async lock per account. It outlives
//! individual watches so a superseding watch waits for a check of the
//! superseded one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Default delay before the first check.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);

/// Default interval between recurring checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Timing of the one-shot and recurring checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSchedule {
    pub initial_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for WatchSchedule {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

struct WatchHandle {
    id: u64,
    stop: watch::Sender<bool>,
}

/// Registry of active watches, at most one per account.
#[derive(Default)]
pub struct WatchRegistry {
    watches: Mutex<HashMap<String, WatchHandle>>,
    cycle_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    next_id: AtomicU64,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) watching `account`, calling `check` with the
    /// account and the watch id on every tick. Returns the id of the new watch.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, account: &str, schedule: WatchSchedule, check: F) -> u64
    where
        F: Fn(String, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let account_owned = account.to_string();

        {
            let mut watches = lock(&self.watches);
            if let Some(previous) = watches.insert(
                account.to_string(),
                WatchHandle { id, stop: stop_tx },
            ) {
                let _ = previous.stop.send(true);
                debug!("Watch #{} for {} superseded by #{}", previous.id, account, id);
            }
        }

        tokio::spawn(async move {
            let started = Instant::now();

            tokio::select! {
                _ = tokio::time::sleep(schedule.initial_delay) => {}
                _ = stop_rx.changed() => return,
            }
            if *stop_rx.borrow() {
                return;
            }
            check(account_owned.clone(), id).await;

            let mut interval =
                tokio::time::interval_at(started + schedule.poll_interval, schedule.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *stop_rx.borrow() {
                    break;
                }
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stop_rx.changed() => break,
                }
                if *stop_rx.borrow() {
                    break;
                }
                check(account_owned.clone(), id).await;
            }
            debug!("Watch #{} for {} finished", id, account_owned);
        });

        info!(
            "Watching {} for attest packets (first check in {:?}, then every {:?})",
            account, schedule.initial_delay, schedule.poll_interval
        );
        id
    }

    /// Stops watching `account`. Returns `false` if it was not watched.
    pub fn stop(&self, account: &str) -> bool {
        match lock(&self.watches).remove(account) {
            Some(handle) => {
                let _ = handle.stop.send(true);
                info!("Stopped watching {} (watch #{})", account, handle.id);
                true
            }
            None => false,
        }
    }

    /// Stops the watch for `account` only if it is still watch `id`. A check
    /// from a superseded watch must not end the watch that replaced it.
    pub fn stop_if(&self, account: &str, id: u64) -> bool {
        let mut watches = lock(&self.watches);
        match watches.get(account) {
            Some(handle) if handle.id == id => {
                if let Some(handle) = watches.remove(account) {
                    let _ = handle.stop.send(true);
                }
                info!("Stopped watching {} (watch #{})", account, id);
                true
            }
            Some(handle) => {
                debug!(
                    "Watch #{} for {} already superseded by #{}, not stopping",
                    id, account, handle.id
                );
                false
            }
            None => false,
        }
    }

    /// Stops every watch.
    pub fn stop_all(&self) {
        for (account, handle) in lock(&self.watches).drain() {
            let _ = handle.stop.send(true);
            debug!("Stopped watching {} (watch #{})", account, handle.id);
        }
    }

    pub fn is_watching(&self, account: &str) -> bool {
        lock(&self.watches).contains_key(account)
    }

    /// Id of the active watch for `account`.
    pub fn watch_id(&self, account: &str) -> Option<u64> {
        lock(&self.watches).get(account).map(|h| h.id)
    }

    /// Accounts currently watched, sorted.
    pub fn watched(&self) -> Vec<String> {
        let mut accounts: Vec<String> = lock(&self.watches).keys().cloned().collect();
        accounts.sort();
        accounts
    }

    /// The lock serializing checks for `account`.
    pub fn cycle_lock(&self, account: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            lock(&self.cycle_locks)
                .entry(account.to_string())
                .or_default(),
        )
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Locks a registry map, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
