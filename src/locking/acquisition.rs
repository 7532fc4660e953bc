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

//! Waiting for a contended resource.
//!
//! A plain `lock` call answers once. A [`LockWait`] describes how long and how
//! often a caller is willing to ask again, and
//! [`PolicyResourceLockManager::lock_with_wait`](crate::locking::manager::PolicyResourceLockManager::lock_with_wait)
//! drives it. Only a refusal leads to another attempt; argument errors end the
//! wait immediately.

use crate::error::{DistLockError, Result};
use crate::locking::cancellation::StopToken;
use crate::locking::timeout::{LockTimeoutSource, LockTimeoutValue};
use crate::locking::wait_observer::LockWaitObserver;
use std::time::{Duration, Instant};

/// Delays between lock attempts: doubling from `first`, never above `ceiling`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    next: Duration,
    ceiling: Duration,
}

impl RetrySchedule {
    pub const FIRST_RETRY: Duration = Duration::from_millis(25);
    pub const MAX_RETRY: Duration = Duration::from_secs(1);

    pub fn new(first: Duration, ceiling: Duration) -> Self {
        Self {
            next: first.min(ceiling),
            ceiling,
        }
    }

    /// Polls at most ten times per lease, within `FIRST_RETRY..=MAX_RETRY`.
    pub fn for_lease(lease: Duration) -> Self {
        let ceiling = (lease / 10).clamp(Self::FIRST_RETRY, Self::MAX_RETRY);
        Self::new(Self::FIRST_RETRY, ceiling)
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::new(Self::FIRST_RETRY, Self::MAX_RETRY)
    }
}

impl Iterator for RetrySchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.next;
        self.next = delay.saturating_mul(2).min(self.ceiling);
        Some(delay)
    }
}

/// One caller's willingness to wait for `resource_id`.
pub struct LockWait<'a> {
    resource_id: String,
    timeout: LockTimeoutValue,
    source: LockTimeoutSource,
    started: Instant,
    deadline: Option<Instant>,
    schedule: RetrySchedule,
    stop: StopToken,
    observer: Option<&'a dyn LockWaitObserver>,
    single_attempt: bool,
    refusals: usize,
}

impl<'a> LockWait<'a> {
    /// Retries until granted or until `timeout` has passed since construction.
    pub fn new(resource_id: impl Into<String>, timeout: LockTimeoutValue) -> Self {
        let started = Instant::now();
        Self {
            resource_id: resource_id.into(),
            timeout,
            source: LockTimeoutSource::Default,
            started,
            deadline: timeout
                .as_duration()
                .and_then(|limit| started.checked_add(limit)),
            schedule: RetrySchedule::default(),
            stop: StopToken::new(),
            observer: None,
            single_attempt: false,
            refusals: 0,
        }
    }

    /// Asks once; a refusal is returned as `Ok(false)` rather than an error.
    pub fn single_attempt(resource_id: impl Into<String>) -> Self {
        Self {
            single_attempt: true,
            ..Self::new(resource_id, LockTimeoutValue::from_secs(0))
        }
    }

    pub fn timeout_from(mut self, source: LockTimeoutSource) -> Self {
        self.source = source;
        self
    }

    pub fn schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn stop_on(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn observed_by(mut self, observer: &'a dyn LockWaitObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Number of refused attempts so far.
    pub fn refusals(&self) -> usize {
        self.refusals
    }

    pub fn waited(&self) -> Duration {
        self.started.elapsed()
    }

    /// Fails with `LockingCancelled` once the stop token has fired.
    pub fn check_stop(&self) -> Result<()> {
        if !self.stop.is_stopped() {
            return Ok(());
        }
        if let Some(observer) = self.observer {
            observer.on_cancelled(&self.resource_id, self.waited());
        }
        Err(DistLockError::LockingCancelled {
            resource: self.resource_id.clone(),
            waited_secs: self.waited().as_secs_f64(),
        })
    }

    /// Records a refusal and picks the pause before the next attempt.
    ///
    /// `Ok(None)` ends a single-attempt wait. The pause never runs past the
    /// deadline; once the deadline has passed the wait fails with
    /// `LockingTimeout`.
    pub(crate) fn after_refusal(&mut self) -> Result<Option<Duration>> {
        if self.single_attempt {
            return Ok(None);
        }
        self.check_stop()?;

        self.refusals += 1;
        if self.refusals == 1 {
            if let Some(observer) = self.observer {
                observer.on_wait_start(&self.resource_id, self.timeout);
            }
        }

        let pause = self.schedule.next().unwrap_or(RetrySchedule::MAX_RETRY);
        let (pause, remaining) = match self.deadline {
            None => (pause, None),
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Err(self.timed_out());
                }
                (pause.min(left), Some(left))
            }
        };

        if let Some(observer) = self.observer {
            observer.on_retry(&self.resource_id, self.refusals, self.waited(), remaining);
        }
        Ok(Some(pause))
    }

    pub(crate) fn granted(&self) {
        if let Some(observer) = self.observer {
            observer.on_acquired(&self.resource_id, self.waited());
        }
    }

    fn timed_out(&self) -> DistLockError {
        if let Some(observer) = self.observer {
            observer.on_timeout(&self.resource_id, self.waited());
        }
        DistLockError::LockingTimeout {
            resource: self.resource_id.clone(),
            waited_secs: self.waited().as_secs_f64(),
            timeout_value: self.timeout,
            timeout_source: self.source,
        }
    }
}
