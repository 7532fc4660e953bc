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

//! Hygiene sweep for lock rows nobody came back for.
//!
//! An expired row is already stealable, so removing it never changes who may
//! lock a resource. The sweep only keeps the table from growing with rows
//! left behind by crashed processes.

use crate::error::Result;
use crate::locking::record::now_millis;
use crate::locking::store::LockStore;
use log::debug;
use std::cmp;
use std::time::{Duration, Instant};

/// Summary of a hygiene sweep.
#[derive(Debug, Default, Clone)]
pub struct LockHygieneReport {
    pub removed: usize,
    pub cutoff_ms: i64,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct LockHygieneRunner<'a> {
    store: &'a LockStore,
    grace: Duration,
}

impl<'a> LockHygieneRunner<'a> {
    pub fn new(store: &'a LockStore, grace: Duration) -> Self {
        Self { store, grace }
    }

    /// Grace period derived from the lease: one full lease plus a minute, never
    /// below ten minutes.
    pub fn default_grace(lease: Duration) -> Duration {
        let minimum = Duration::from_secs(600);
        lease
            .checked_add(Duration::from_secs(60))
            .map(|candidate| cmp::max(candidate, minimum))
            .unwrap_or(minimum)
    }

    pub fn run(&self) -> Result<LockHygieneReport> {
        self.run_with_now(now_millis())
    }

    pub(crate) fn run_with_now(&self, now_ms: i64) -> Result<LockHygieneReport> {
        let start = Instant::now();
        let grace_ms = i64::try_from(self.grace.as_millis()).unwrap_or(i64::MAX);
        let cutoff_ms = now_ms.saturating_sub(grace_ms);

        let removed = self.store.purge_expired_before(cutoff_ms)?;
        let report = LockHygieneReport {
            removed,
            cutoff_ms,
            duration: start.elapsed(),
        };
        debug!(
            "Lock hygiene sweep removed {} row(s) expired before {} in {:.3}s",
            report.removed,
            report.cutoff_ms,
            report.duration.as_secs_f64()
        );
        Ok(report)
    }
}
