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

use crate::locking::timeout::LockTimeoutValue;
use log::warn;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Pending,
    /// The waiter left before the worker answered.
    Abandoned,
    Done(bool),
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
    answered: Condvar,
}

impl Shared {
    fn new(slot: Slot) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(slot),
            answered: Condvar::new(),
        })
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of a lock attempt running on its own thread.
///
/// The worker and the waiter settle the outcome under one mutex: either the
/// worker records its answer first, or the waiter marks the attempt abandoned
/// first and the worker releases anything it acquired.
#[derive(Debug)]
pub struct LockFuture {
    resource_id: String,
    shared: Arc<Shared>,
}

impl LockFuture {
    /// Runs `task` on a new thread. `rollback` runs on that thread when the
    /// task acquired but the future was abandoned.
    pub fn spawn<T, R>(resource_id: &str, task: T, rollback: R) -> Self
    where
        T: FnOnce() -> bool + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        let shared = Shared::new(Slot::Pending);
        let worker_shared = Arc::clone(&shared);
        let label = resource_id.to_string();

        let spawned = thread::Builder::new()
            .name(format!("distlock-acquire-{resource_id}"))
            .spawn(move || {
                let acquired = panic::catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|_| {
                    warn!("Lock worker for {label} panicked");
                    false
                });

                let mut slot = worker_shared.slot();
                if *slot == Slot::Abandoned {
                    drop(slot);
                    if acquired {
                        warn!("Lock on {label} acquired after its waiter gave up; releasing it");
                        rollback();
                    }
                    return;
                }
                *slot = Slot::Done(acquired);
                worker_shared.answered.notify_all();
            });

        if let Err(err) = spawned {
            warn!("Failed to spawn lock worker for {resource_id}: {err}");
            return Self::resolved(resource_id, false);
        }

        Self {
            resource_id: resource_id.to_string(),
            shared,
        }
    }

    /// Already-completed future.
    pub fn resolved(resource_id: &str, value: bool) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            shared: Shared::new(Slot::Done(value)),
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Non-blocking poll; `None` while the worker is still running. The answer
    /// stays available to later polls and to [`wait`](Self::wait).
    pub fn try_get(&self) -> Option<bool> {
        match *self.shared.slot() {
            Slot::Pending => None,
            Slot::Abandoned => Some(false),
            Slot::Done(value) => Some(value),
        }
    }

    /// Blocks until the worker answers or `timeout` elapses. On timeout the
    /// attempt is abandoned and reads as `false`.
    pub fn wait(self, timeout: LockTimeoutValue) -> bool {
        let still_pending = |slot: &mut Slot| *slot == Slot::Pending;
        let guard = self.shared.slot();
        let mut slot = match timeout.as_duration() {
            None => self
                .shared
                .answered
                .wait_while(guard, still_pending)
                .unwrap_or_else(PoisonError::into_inner),
            Some(limit) => {
                self.shared
                    .answered
                    .wait_timeout_while(guard, limit, still_pending)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };

        match *slot {
            Slot::Done(value) => value,
            Slot::Abandoned => false,
            Slot::Pending => {
                *slot = Slot::Abandoned;
                warn!(
                    "Gave up waiting for lock on {} after {timeout}",
                    self.resource_id
                );
                false
            }
        }
    }
}

impl Drop for LockFuture {
    fn drop(&mut self) {
        let mut slot = self.shared.slot();
        if *slot == Slot::Pending {
            *slot = Slot::Abandoned;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    /// Worker that acquires once `release` is signalled.
    fn gated_worker(
        rolled_back: &Arc<AtomicBool>,
    ) -> (LockFuture, mpsc::Sender<()>, mpsc::Receiver<()>) {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let flag = Arc::clone(rolled_back);
        let future = LockFuture::spawn(
            "r",
            move || {
                let _ = release_rx.recv();
                true
            },
            move || {
                flag.store(true, Ordering::SeqCst);
                let _ = done_tx.send(());
            },
        );
        (future, release_tx, done_rx)
    }

    #[test]
    fn resolves_with_task_result() {
        let future = LockFuture::spawn("r", || true, || {});
        assert!(future.wait(LockTimeoutValue::from_secs(5)));

        let future = LockFuture::spawn("r", || false, || {});
        assert!(!future.wait(LockTimeoutValue::Infinite));
    }

    #[test]
    fn resolved_future_is_ready() {
        let future = LockFuture::resolved("r", true);
        assert_eq!(future.try_get(), Some(true));
        assert_eq!(future.try_get(), Some(true));
    }

    #[test]
    fn polled_answer_is_still_returned_by_wait() {
        let future = LockFuture::spawn("r", || true, || {});
        let deadline = Instant::now() + Duration::from_secs(5);
        while future.try_get().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(future.try_get(), Some(true));
        assert!(future.wait(LockTimeoutValue::from_millis(10)));
    }

    #[test]
    fn panicking_worker_reads_as_false() {
        let future = LockFuture::spawn("r", || panic!("store exploded"), || {});
        assert!(!future.wait(LockTimeoutValue::Infinite));
    }

    #[test]
    fn late_acquisition_after_timeout_is_rolled_back() {
        let rolled_back = Arc::new(AtomicBool::new(false));
        let (future, release, done) = gated_worker(&rolled_back);
        assert_eq!(future.try_get(), None);
        assert!(!future.wait(LockTimeoutValue::from_millis(50)));
        assert!(!rolled_back.load(Ordering::SeqCst));

        release.send(()).unwrap();
        done.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(rolled_back.load(Ordering::SeqCst));
    }

    #[test]
    fn dropped_future_rolls_back_late_acquisition() {
        let rolled_back = Arc::new(AtomicBool::new(false));
        let (future, release, done) = gated_worker(&rolled_back);
        drop(future);

        release.send(()).unwrap();
        done.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(rolled_back.load(Ordering::SeqCst));
    }

    #[test]
    fn answered_future_is_not_rolled_back() {
        let rolled_back = Arc::new(AtomicBool::new(false));
        let (future, release, _done) = gated_worker(&rolled_back);
        release.send(()).unwrap();
        assert!(future.wait(LockTimeoutValue::from_secs(5)));
        assert!(!rolled_back.load(Ordering::SeqCst));
    }
}
