// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Periodic lease renewal for locks held by this process.
//!
//! The scheduler owns one background thread. Each tick refreshes every
//! tracked lock through the [`TargetLockClient`]; a lock whose refresh fails
//! is considered lost, dropped from the held set, and reported to the
//! [`LockLossObserver`]. Lost locks are never re-acquired automatically.

use crate::error::{DistLockError, Result};
use crate::locking::client::TargetLockClient;
use log::{debug, info, trace, warn};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A lock this process believes it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldLock {
    pub resource_id: String,
    pub owner: String,
    pub lease: Duration,
}

/// Hooks for heartbeat outcomes.
pub trait LockLossObserver: Send + Sync {
    fn on_lock_lost(&self, _lock: &HeldLock) {}

    fn on_tick(&self, _report: &HeartbeatReport) {}
}

/// Observer implementation that performs no work.
#[derive(Debug, Default)]
pub struct NoopLockLossObserver;

impl LockLossObserver for NoopLockLossObserver {}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub refreshed: usize,
    pub lost: Vec<HeldLock>,
}

struct HeartbeatState {
    client: Arc<TargetLockClient>,
    held: Mutex<BTreeMap<String, HeldLock>>,
    observer: Arc<dyn LockLossObserver>,
}

impl HeartbeatState {
    fn tick(&self) -> HeartbeatReport {
        let snapshot: Vec<HeldLock> = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        self.refresh_all(snapshot)
    }

    fn refresh_all(&self, snapshot: Vec<HeldLock>) -> HeartbeatReport {
        let mut report = HeartbeatReport::default();
        for lock in snapshot {
            if self
                .client
                .refresh(&lock.resource_id, &lock.owner, lock.lease)
            {
                trace!("Heartbeat refreshed {} for {}", lock.resource_id, lock.owner);
                report.refreshed += 1;
                continue;
            }

            // Untracked or re-tracked since the snapshot: not a loss.
            let still_tracked = {
                let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
                if held.get(&lock.resource_id) == Some(&lock) {
                    held.remove(&lock.resource_id);
                    true
                } else {
                    false
                }
            };
            if !still_tracked {
                trace!(
                    "Skipping {} for {}; no longer tracked",
                    lock.resource_id, lock.owner
                );
                continue;
            }

            warn!(
                "Lost lock on {} for {}; it will not be renewed",
                lock.resource_id, lock.owner
            );
            self.observer.on_lock_lost(&lock);
            report.lost.push(lock);
        }

        self.observer.on_tick(&report);
        report
    }
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct HeartbeatScheduler {
    state: Arc<HeartbeatState>,
    interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl HeartbeatScheduler {
    pub fn new(client: Arc<TargetLockClient>, interval: Duration) -> Self {
        Self::with_observer(client, interval, Arc::new(NoopLockLossObserver))
    }

    pub fn with_observer(
        client: Arc<TargetLockClient>,
        interval: Duration,
        observer: Arc<dyn LockLossObserver>,
    ) -> Self {
        Self {
            state: Arc::new(HeartbeatState {
                client,
                held: Mutex::new(BTreeMap::new()),
                observer,
            }),
            interval,
            worker: Mutex::new(None),
        }
    }

    /// Starts the background thread. Calling it while running is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Ok(());
        }

        let (stop, stop_rx) = mpsc::channel::<()>();
        let state = Arc::clone(&self.state);
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("distlock-heartbeat".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            state.tick();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Heartbeat thread exiting");
            })
            .map_err(|err| {
                DistLockError::SystemError(format!("Failed to spawn heartbeat thread: {err}"))
            })?;

        info!("Started lock heartbeat every {:.3}s", interval.as_secs_f64());
        *worker = Some(Worker { stop, handle });
        Ok(())
    }

    /// Stops the background thread and waits for it. Safe to call repeatedly.
    pub fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(worker) = worker else {
            return;
        };

        let _ = worker.stop.send(());
        if worker.handle.join().is_err() {
            warn!("Heartbeat thread panicked before shutdown");
        } else {
            info!("Stopped lock heartbeat");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Starts renewing `resource_id` for `owner`. Replaces any previous entry.
    pub fn track(&self, resource_id: &str, owner: &str, lease: Duration) {
        if lease > Duration::ZERO && lease <= self.interval {
            debug!(
                "Lease for {resource_id} ({:.3}s) is not longer than the heartbeat interval",
                lease.as_secs_f64()
            );
        }
        self.held_map().insert(
            resource_id.to_string(),
            HeldLock {
                resource_id: resource_id.to_string(),
                owner: owner.to_string(),
                lease,
            },
        );
    }

    /// Stops renewing `resource_id` if it is held by `owner`.
    pub fn untrack(&self, resource_id: &str, owner: &str) -> bool {
        let mut held = self.held_map();
        match held.get(resource_id) {
            Some(lock) if lock.owner == owner => held.remove(resource_id).is_some(),
            _ => false,
        }
    }

    pub fn held(&self) -> Vec<HeldLock> {
        self.held_map().values().cloned().collect()
    }

    /// Runs one renewal pass on the calling thread.
    pub fn tick(&self) -> HeartbeatReport {
        self.state.tick()
    }

    fn held_map(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, HeldLock>> {
        self.state
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::record::{LockRow, now_millis};
    use crate::locking::store::LockStore;

    const LEASE: Duration = Duration::from_secs(60);

    #[derive(Default)]
    struct RecordingObserver {
        lost: Mutex<Vec<String>>,
    }

    impl LockLossObserver for RecordingObserver {
        fn on_lock_lost(&self, lock: &HeldLock) {
            self.lost.lock().unwrap().push(lock.resource_id.clone());
        }
    }

    fn client() -> Arc<TargetLockClient> {
        let store = LockStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        Arc::new(TargetLockClient::new(Arc::new(store), "host-a"))
    }

    #[test]
    fn tick_extends_held_leases() {
        let client = client();
        client
            .store()
            .insert_if_absent(&LockRow::new("r1", "host-a", "o1", now_millis() + 10))
            .unwrap();
        let heartbeat = HeartbeatScheduler::new(Arc::clone(&client), Duration::from_secs(20));
        heartbeat.track("r1", "o1", LEASE);

        let report = heartbeat.tick();
        assert_eq!(report.refreshed, 1);
        assert!(report.lost.is_empty());
        assert!(client.row("r1").unwrap().expiration_time > now_millis() + 50_000);
    }

    #[test]
    fn lost_lock_is_dropped_and_reported_without_stopping_others() {
        let client = client();
        assert!(client.acquire("kept", "o1", LEASE));
        assert!(client.acquire("stolen", "o1", LEASE));
        assert!(client.release("stolen", "o1"));
        assert!(client.acquire("stolen", "o2", LEASE));

        let observer = Arc::new(RecordingObserver::default());
        let heartbeat = HeartbeatScheduler::with_observer(
            Arc::clone(&client),
            Duration::from_secs(20),
            observer.clone(),
        );
        heartbeat.track("stolen", "o1", LEASE);
        heartbeat.track("kept", "o1", LEASE);

        let report = heartbeat.tick();
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.lost.len(), 1);
        assert_eq!(report.lost[0].resource_id, "stolen");
        assert_eq!(*observer.lost.lock().unwrap(), vec!["stolen".to_string()]);

        let held: Vec<_> = heartbeat.held().into_iter().map(|l| l.resource_id).collect();
        assert_eq!(held, vec!["kept".to_string()]);

        // Ownership loss is terminal: the next tick does not retry it.
        assert_eq!(heartbeat.tick().lost.len(), 0);
        assert_eq!(client.row("stolen").unwrap().owner, "o2");
    }

    #[test]
    fn release_during_tick_is_not_reported_as_loss() {
        let client = client();
        assert!(client.acquire("r1", "o1", LEASE));
        let observer = Arc::new(RecordingObserver::default());
        let heartbeat = HeartbeatScheduler::with_observer(
            Arc::clone(&client),
            Duration::from_secs(20),
            observer.clone(),
        );
        heartbeat.track("r1", "o1", LEASE);

        // Unlock lands after the tick took its snapshot but before the refresh.
        let snapshot = heartbeat.held();
        assert!(heartbeat.untrack("r1", "o1"));
        assert!(client.release("r1", "o1"));

        let report = heartbeat.state.refresh_all(snapshot);
        assert_eq!(report.refreshed, 0);
        assert!(report.lost.is_empty());
        assert!(observer.lost.lock().unwrap().is_empty());
    }

    #[test]
    fn untrack_requires_matching_owner() {
        let heartbeat = HeartbeatScheduler::new(client(), Duration::from_secs(1));
        heartbeat.track("r1", "o1", LEASE);
        assert!(!heartbeat.untrack("r1", "o2"));
        assert!(heartbeat.untrack("r1", "o1"));
        assert!(heartbeat.held().is_empty());
    }

    #[test]
    fn background_thread_refreshes_and_stops_cleanly() {
        let client = client();
        assert!(client.acquire("r1", "o1", Duration::from_millis(300)));
        let heartbeat = HeartbeatScheduler::new(Arc::clone(&client), Duration::from_millis(50));
        heartbeat.track("r1", "o1", Duration::from_millis(300));

        heartbeat.start().unwrap();
        heartbeat.start().unwrap();
        assert!(heartbeat.is_running());
        thread::sleep(Duration::from_millis(600));
        assert!(client.is_active("r1", "o1"));

        heartbeat.stop();
        heartbeat.stop();
        assert!(!heartbeat.is_running());
    }
}
