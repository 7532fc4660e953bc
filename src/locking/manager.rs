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

//! Lock manager with pluggable interception and an in-memory fallback.
//!
//! Each public operation first offers the request to the registered
//! [`LockFeature`]s in registration order. The first decisive verdict wins and
//! nothing else runs. When every feature passes, the manager applies its own
//! single-process policy and then notifies the features through the matching
//! `after_*` hook, stopping at the first one that consumes the notification.

use crate::error::{DistLockError, Result};
use crate::locking::acquisition::LockWait;
use crate::locking::feature::{LockFeature, OperResult};
use crate::locking::guard::ResourceLockGuard;
use crate::locking::store::MAX_ID_CHARS;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

pub struct PolicyResourceLockManager {
    features: Vec<Arc<dyn LockFeature>>,
    locks: Mutex<HashMap<String, String>>,
}

impl PolicyResourceLockManager {
    /// Manager with no features: pure in-memory mutual exclusion.
    pub fn new() -> Self {
        Self::with_features(Vec::new())
    }

    pub fn with_features(features: Vec<Arc<dyn LockFeature>>) -> Self {
        Self {
            features,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Appends a feature; it is consulted after every feature registered before it.
    pub fn register(&mut self, feature: Arc<dyn LockFeature>) {
        debug!("Registered lock feature {}", feature.name());
        self.features.push(feature);
    }

    /// Runs every feature's `after_start`. A feature that fails stays inactive.
    pub fn start(&self) {
        for feature in &self.features {
            match guarded(|| feature.after_start()) {
                Some(Ok(())) => info!("Lock feature {} started", feature.name()),
                Some(Err(err)) => warn!("Lock feature {} failed to start: {err}", feature.name()),
                None => warn!("Lock feature {} panicked during start", feature.name()),
            }
        }
    }

    pub fn shutdown(&self) {
        for feature in &self.features {
            if guarded(|| feature.before_shutdown()).is_none() {
                warn!("Lock feature {} panicked during shutdown", feature.name());
            }
        }
    }

    pub fn lock(&self, resource_id: &str, owner: &str, hold_secs: u64) -> Result<bool> {
        validate(resource_id, Some(owner))?;

        if let Some(verdict) =
            self.dispatch_before("lock", |feature| feature.before_lock(resource_id, owner, hold_secs))
        {
            return Ok(verdict);
        }

        let locked = {
            let mut locks = self.default_locks();
            if locks.contains_key(resource_id) {
                false
            } else {
                locks.insert(resource_id.to_string(), owner.to_string());
                true
            }
        };
        debug!("Default policy lock {resource_id} for {owner}: {locked}");

        self.dispatch_after("lock", |feature| feature.after_lock(resource_id, owner, locked));
        Ok(locked)
    }

    pub fn refresh(&self, resource_id: &str, owner: &str, hold_secs: u64) -> Result<bool> {
        validate(resource_id, Some(owner))?;

        if let Some(verdict) = self.dispatch_before("refresh", |feature| {
            feature.before_refresh(resource_id, owner, hold_secs)
        }) {
            return Ok(verdict);
        }

        let refreshed = self.held_by(resource_id, owner);
        self.dispatch_after("refresh", |feature| {
            feature.after_refresh(resource_id, owner, refreshed)
        });
        Ok(refreshed)
    }

    /// The built-in policy removes the entry whoever holds it.
    pub fn unlock(&self, resource_id: &str, owner: &str) -> Result<bool> {
        validate(resource_id, Some(owner))?;

        if let Some(verdict) =
            self.dispatch_before("unlock", |feature| feature.before_unlock(resource_id, owner))
        {
            return Ok(verdict);
        }

        let unlocked = self.default_locks().remove(resource_id).is_some();
        debug!("Default policy unlock {resource_id} by {owner}: {unlocked}");

        self.dispatch_after("unlock", |feature| {
            feature.after_unlock(resource_id, owner, unlocked)
        });
        Ok(unlocked)
    }

    pub fn is_locked(&self, resource_id: &str) -> Result<bool> {
        validate(resource_id, None)?;

        if let Some(verdict) =
            self.dispatch_before("is_locked", |feature| feature.before_is_locked(resource_id))
        {
            return Ok(verdict);
        }

        Ok(self.default_locks().contains_key(resource_id))
    }

    pub fn is_locked_by(&self, resource_id: &str, owner: &str) -> Result<bool> {
        validate(resource_id, Some(owner))?;

        if let Some(verdict) = self.dispatch_before("is_locked_by", |feature| {
            feature.before_is_locked_by(resource_id, owner)
        }) {
            return Ok(verdict);
        }

        Ok(self.held_by(resource_id, owner))
    }

    /// Locks and returns a guard that unlocks on drop, or `None` if not granted.
    pub fn lock_guard(
        &self,
        resource_id: &str,
        owner: &str,
        hold_secs: u64,
    ) -> Result<Option<ResourceLockGuard<'_>>> {
        if self.lock(resource_id, owner, hold_secs)? {
            Ok(Some(ResourceLockGuard::new(self, resource_id, owner)))
        } else {
            Ok(None)
        }
    }

    /// Repeats [`lock`](Self::lock) on refusal until it succeeds, the wait's
    /// deadline passes, or its stop token fires.
    ///
    /// Returns `Ok(false)` only for a [`LockWait::single_attempt`] that was refused.
    pub fn lock_with_wait(
        &self,
        owner: &str,
        hold_secs: u64,
        wait: &mut LockWait<'_>,
    ) -> Result<bool> {
        let resource_id = wait.resource_id().to_string();

        loop {
            wait.check_stop()?;

            if self.lock(&resource_id, owner, hold_secs)? {
                debug!(
                    "Acquired {resource_id} for {owner} after {} refusals ({:.3}s)",
                    wait.refusals(),
                    wait.waited().as_secs_f64()
                );
                wait.granted();
                return Ok(true);
            }

            match wait.after_refusal()? {
                Some(pause) => thread::sleep(pause),
                None => return Ok(false),
            }
        }
    }

    fn held_by(&self, resource_id: &str, owner: &str) -> bool {
        self.default_locks()
            .get(resource_id)
            .is_some_and(|holder| holder == owner)
    }

    // The map is never left half-updated, so a poisoned guard is still usable.
    fn default_locks(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch_before<F>(&self, operation: &str, hook: F) -> Option<bool>
    where
        F: Fn(&dyn LockFeature) -> Result<OperResult>,
    {
        for feature in &self.features {
            match guarded(|| hook(feature.as_ref())) {
                Some(Ok(result)) => {
                    if let Some(verdict) = result.verdict() {
                        debug!(
                            "Lock feature {} decided {operation}: {verdict}",
                            feature.name()
                        );
                        return Some(verdict);
                    }
                }
                Some(Err(err)) => {
                    warn!(
                        "Lock feature {} failed in before {operation}: {err}",
                        feature.name()
                    );
                }
                None => {
                    warn!(
                        "Lock feature {} panicked in before {operation}",
                        feature.name()
                    );
                }
            }
        }
        None
    }

    fn dispatch_after<F>(&self, operation: &str, hook: F)
    where
        F: Fn(&dyn LockFeature) -> Result<bool>,
    {
        for feature in &self.features {
            match guarded(|| hook(feature.as_ref())) {
                Some(Ok(true)) => return,
                Some(Ok(false)) => {}
                Some(Err(err)) => {
                    warn!(
                        "Lock feature {} failed in after {operation}: {err}",
                        feature.name()
                    );
                }
                None => {
                    warn!(
                        "Lock feature {} panicked in after {operation}",
                        feature.name()
                    );
                }
            }
        }
    }
}

impl Default for PolicyResourceLockManager {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(resource_id: &str, owner: Option<&str>) -> Result<()> {
    if resource_id.is_empty() {
        return Err(DistLockError::InvalidArgument(
            "resource id must not be empty".to_string(),
        ));
    }
    if owner.is_some_and(str::is_empty) {
        return Err(DistLockError::InvalidArgument(
            "owner must not be empty".to_string(),
        ));
    }
    if resource_id.chars().count() > MAX_ID_CHARS {
        return Err(DistLockError::InvalidArgument(format!(
            "resource id must be at most {MAX_ID_CHARS} characters"
        )));
    }
    if owner.is_some_and(|owner| owner.chars().count() > MAX_ID_CHARS) {
        return Err(DistLockError::InvalidArgument(format!(
            "owner must be at most {MAX_ID_CHARS} characters"
        )));
    }
    Ok(())
}

/// Runs a feature hook, converting a panic into `None`.
fn guarded<T>(hook: impl FnOnce() -> T) -> Option<T> {
    panic::catch_unwind(AssertUnwindSafe(hook)).ok()
}
