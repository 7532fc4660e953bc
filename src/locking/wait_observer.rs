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

//! Observer hooks for callers that wait on contended resources.

use crate::locking::timeout::LockTimeoutValue;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait LockWaitObserver: Send + Sync {
    fn on_wait_start(&self, _resource_id: &str, _timeout: LockTimeoutValue) {}

    fn on_retry(
        &self,
        _resource_id: &str,
        _attempt: usize,
        _elapsed: Duration,
        _remaining: Option<Duration>,
    ) {
    }

    fn on_acquired(&self, _resource_id: &str, _waited: Duration) {}

    fn on_timeout(&self, _resource_id: &str, _waited: Duration) {}

    fn on_cancelled(&self, _resource_id: &str, _waited: Duration) {}
}

#[derive(Debug, Default)]
pub struct NoopLockWaitObserver;

impl LockWaitObserver for NoopLockWaitObserver {}

/// Writes throttled wait progress to stderr for interactive commands.
pub struct StderrWaitObserver {
    min_interval: Duration,
    last_emit: Mutex<Option<Instant>>,
}

impl StderrWaitObserver {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(1))
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: Mutex::new(None),
        }
    }

    fn should_emit(&self) -> bool {
        let Ok(mut last) = self.last_emit.lock() else {
            return false;
        };
        let now = Instant::now();
        match *last {
            Some(previous) if now.duration_since(previous) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl Default for StderrWaitObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl LockWaitObserver for StderrWaitObserver {
    fn on_wait_start(&self, resource_id: &str, timeout: LockTimeoutValue) {
        eprintln!("Waiting for lock on {resource_id} (timeout: {timeout}); Ctrl-C to cancel.");
    }

    fn on_retry(
        &self,
        resource_id: &str,
        _attempt: usize,
        elapsed: Duration,
        remaining: Option<Duration>,
    ) {
        if !self.should_emit() {
            return;
        }
        let remaining_text = remaining
            .map(|value| format!(" (~{}s remaining)", value.as_secs()))
            .unwrap_or_default();
        eprintln!(
            "Still waiting for lock on {resource_id}: elapsed {}s{remaining_text}",
            elapsed.as_secs()
        );
    }

    fn on_acquired(&self, resource_id: &str, waited: Duration) {
        if waited >= self.min_interval {
            eprintln!(
                "Lock on {resource_id} acquired after {:.1}s.",
                waited.as_secs_f64()
            );
        }
    }

    fn on_timeout(&self, resource_id: &str, waited: Duration) {
        eprintln!(
            "Gave up on {resource_id} after {:.1}s.",
            waited.as_secs_f64()
        );
    }

    fn on_cancelled(&self, resource_id: &str, waited: Duration) {
        eprintln!(
            "Cancelled wait for {resource_id} after {:.1}s.",
            waited.as_secs_f64()
        );
    }
}
