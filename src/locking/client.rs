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

//! Acquire, refresh, release, and query protocol over a [`LockStore`].
//!
//! Every public operation answers with a plain boolean. Storage faults are
//! logged here and reported as "not acquired", so an unreachable database
//! looks the same to callers as a contended resource.

use crate::error::Result;
use crate::locking::record::{LockRow, deadline_after, now_millis};
use crate::locking::store::LockStore;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TargetLockClient {
    store: Arc<LockStore>,
    host: String,
}

impl TargetLockClient {
    pub fn new(store: Arc<LockStore>, host: impl Into<String>) -> Self {
        Self {
            store,
            host: host.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn store(&self) -> &Arc<LockStore> {
        &self.store
    }

    /// Claims `resource_id` for `owner` for `lease`.
    ///
    /// A live row always wins, including one already held by `owner`. A stale
    /// row is taken over only if the conditional UPDATE still sees it stale.
    pub fn acquire(&self, resource_id: &str, owner: &str, lease: Duration) -> bool {
        self.try_acquire(resource_id, owner, lease)
            .unwrap_or_else(|err| {
                warn!("Failed to acquire lock on {resource_id} for {owner}: {err}");
                false
            })
    }

    /// Fallible form of [`acquire`](Self::acquire) for callers that log themselves.
    pub fn try_acquire(&self, resource_id: &str, owner: &str, lease: Duration) -> Result<bool> {
        let now = now_millis();
        let claim = LockRow::new(resource_id, &self.host, owner, deadline_after(now, lease));

        if self.store.insert_if_absent(&claim)? {
            debug!("Inserted lock row for {resource_id} owned by {owner}");
            return Ok(true);
        }

        let Some(existing) = self.store.select(resource_id)? else {
            // Released between our INSERT and SELECT; the caller decides whether to retry.
            debug!("Lock row for {resource_id} vanished during acquire");
            return Ok(false);
        };

        if !existing.is_expired_at(now) {
            debug!(
                "Lock on {resource_id} is held by {} on {} until {}",
                existing.owner, existing.host, existing.expiration_time
            );
            return Ok(false);
        }

        let stolen = self.store.steal_if_expired(&claim, now)?;
        if stolen {
            debug!(
                "Took over stale lock on {resource_id} from {} for {owner}",
                existing.owner
            );
        } else {
            debug!("Lost race to take over stale lock on {resource_id}");
        }
        Ok(stolen)
    }

    /// Pushes the deadline of a row still owned by `owner` to `now + hold`.
    ///
    /// An expired row that nobody has taken over yet can be revived this way.
    pub fn refresh(&self, resource_id: &str, owner: &str, hold: Duration) -> bool {
        let deadline = deadline_after(now_millis(), hold);
        self.store
            .extend(resource_id, owner, deadline)
            .unwrap_or_else(|err| {
                warn!("Failed to refresh lock on {resource_id} for {owner}: {err}");
                false
            })
    }

    pub fn release(&self, resource_id: &str, owner: &str) -> bool {
        self.store
            .delete(resource_id, owner)
            .unwrap_or_else(|err| {
                warn!("Failed to release lock on {resource_id} for {owner}: {err}");
                false
            })
    }

    /// True when `owner` holds a row for `resource_id` whose lease has not run out.
    pub fn is_active(&self, resource_id: &str, owner: &str) -> bool {
        self.store
            .is_active(resource_id, owner, now_millis())
            .unwrap_or_else(|err| {
                warn!("Failed to query lock on {resource_id} for {owner}: {err}");
                false
            })
    }

    /// Always `true`: a resource that reaches the distributed store is treated
    /// as engaged. No liveness check is made; use [`is_active`](Self::is_active)
    /// for that.
    pub fn is_locked(&self, resource_id: &str) -> bool {
        debug!("Reporting {resource_id} as locked without consulting the store");
        true
    }

    pub fn row(&self, resource_id: &str) -> Option<LockRow> {
        self.store.select(resource_id).unwrap_or_else(|err| {
            warn!("Failed to read lock row for {resource_id}: {err}");
            None
        })
    }

    pub fn rows(&self) -> Vec<LockRow> {
        self.store.list().unwrap_or_else(|err| {
            warn!("Failed to list lock rows: {err}");
            Vec::new()
        })
    }
}
