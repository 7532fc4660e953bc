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

//! Lock feature backed by the shared `locks` table.
//!
//! Once started, this feature answers every lock query itself, so the
//! manager's in-memory fallback is only consulted when the feature is
//! inactive. Acquisition runs on a worker thread and is awaited with a bounded
//! wait; locks granted here are renewed by the heartbeat until unlocked.

use crate::config::DistLockConfig;
use crate::error::{DistLockError, Result};
use crate::locking::client::TargetLockClient;
use crate::locking::feature::{LockFeature, OperResult};
use crate::locking::future::LockFuture;
use crate::locking::heartbeat::{
    HeartbeatScheduler, HeldLock, LockLossObserver, NoopLockLossObserver,
};
use crate::locking::hygiene::LockHygieneRunner;
use crate::locking::store::LockStore;
use crate::locking::timeout::LockTimeoutValue;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

pub const FEATURE_NAME: &str = "distributed-locking";

#[derive(Debug, Clone, PartialEq)]
pub struct DistributedLockingSettings {
    pub database: PathBuf,
    pub host: String,
    pub default_hold: Duration,
    pub heartbeat_interval: Duration,
    pub wait_timeout: LockTimeoutValue,
    pub busy_timeout: Duration,
    pub purge_on_start: bool,
    pub purge_grace: Duration,
}

impl DistributedLockingSettings {
    pub fn from_config(config: &DistLockConfig) -> Self {
        let locking = &config.locking;
        Self {
            database: config.database_path(),
            host: locking.host_name(),
            default_hold: locking.default_hold(),
            heartbeat_interval: locking.heartbeat_interval(),
            wait_timeout: locking.lock_wait_timeout,
            busy_timeout: locking.busy_timeout(),
            purge_on_start: locking.purge_on_start,
            purge_grace: locking.purge_grace(),
        }
    }

    pub fn with_wait_timeout(mut self, wait_timeout: LockTimeoutValue) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// `hold_secs` when non-zero, else the configured default lease.
    pub fn lease_for(&self, hold_secs: u64) -> Duration {
        if hold_secs == 0 {
            self.default_hold
        } else {
            Duration::from_secs(hold_secs)
        }
    }
}

struct ActiveState {
    client: Arc<TargetLockClient>,
    heartbeat: HeartbeatScheduler,
}

pub struct DistributedLockingFeature {
    settings: DistributedLockingSettings,
    preopened: Option<Arc<LockStore>>,
    loss_observer: Arc<dyn LockLossObserver>,
    state: RwLock<Option<ActiveState>>,
}

impl DistributedLockingFeature {
    pub fn new(settings: DistributedLockingSettings) -> Self {
        Self {
            settings,
            preopened: None,
            loss_observer: Arc::new(NoopLockLossObserver),
            state: RwLock::new(None),
        }
    }

    /// Uses `store` instead of opening `settings.database` on start.
    pub fn with_store(settings: DistributedLockingSettings, store: Arc<LockStore>) -> Self {
        Self {
            settings,
            preopened: Some(store),
            loss_observer: Arc::new(NoopLockLossObserver),
            state: RwLock::new(None),
        }
    }

    pub fn with_loss_observer(mut self, observer: Arc<dyn LockLossObserver>) -> Self {
        self.loss_observer = observer;
        self
    }

    pub fn settings(&self) -> &DistributedLockingSettings {
        &self.settings
    }

    pub fn is_started(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Client of the running feature, if started.
    pub fn client(&self) -> Option<Arc<TargetLockClient>> {
        self.with_active(|active| Arc::clone(&active.client))
    }

    /// Locks currently renewed by the heartbeat.
    pub fn held(&self) -> Vec<HeldLock> {
        self.with_active(|active| active.heartbeat.held())
            .unwrap_or_default()
    }

    /// Starts an acquisition on a worker thread.
    ///
    /// Resolves `false` immediately when the feature is not running. A lock
    /// that the worker obtains after its waiter gave up is released again.
    pub fn begin_lock(&self, resource_id: &str, owner: &str, hold_secs: u64) -> LockFuture {
        let Some(client) = self.client() else {
            return LockFuture::resolved(resource_id, false);
        };

        let lease = self.settings.lease_for(hold_secs);
        let task_client = Arc::clone(&client);
        let (resource, holder) = (resource_id.to_string(), owner.to_string());
        let (rollback_resource, rollback_owner) = (resource.clone(), holder.clone());

        LockFuture::spawn(
            resource_id,
            move || task_client.acquire(&resource, &holder, lease),
            move || {
                client.release(&rollback_resource, &rollback_owner);
            },
        )
    }

    fn with_active<T>(&self, f: impl FnOnce(&ActiveState) -> T) -> Option<T> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }

    fn open_store(&self) -> Result<Arc<LockStore>> {
        if let Some(store) = &self.preopened {
            return Ok(Arc::clone(store));
        }
        let store = LockStore::open(&self.settings.database, self.settings.busy_timeout)?;
        Ok(Arc::new(store))
    }

    fn start_error(&self, err: DistLockError) -> DistLockError {
        DistLockError::FeatureStart {
            feature: FEATURE_NAME.to_string(),
            details: err.to_string(),
        }
    }
}

impl LockFeature for DistributedLockingFeature {
    fn name(&self) -> &str {
        FEATURE_NAME
    }

    fn before_lock(&self, resource_id: &str, owner: &str, hold_secs: u64) -> Result<OperResult> {
        if !self.is_started() {
            return Ok(OperResult::Unhandled);
        }

        let locked = self
            .begin_lock(resource_id, owner, hold_secs)
            .wait(self.settings.wait_timeout);
        if locked {
            let lease = self.settings.lease_for(hold_secs);
            self.with_active(|active| active.heartbeat.track(resource_id, owner, lease));
        }
        Ok(OperResult::from_bool(locked))
    }

    fn before_refresh(&self, resource_id: &str, owner: &str, hold_secs: u64) -> Result<OperResult> {
        let lease = self.settings.lease_for(hold_secs);
        let outcome = self.with_active(|active| {
            let refreshed = active.client.refresh(resource_id, owner, lease);
            if refreshed {
                active.heartbeat.track(resource_id, owner, lease);
            }
            OperResult::from_bool(refreshed)
        });
        Ok(outcome.unwrap_or(OperResult::Unhandled))
    }

    fn before_unlock(&self, resource_id: &str, owner: &str) -> Result<OperResult> {
        let outcome = self.with_active(|active| {
            active.heartbeat.untrack(resource_id, owner);
            OperResult::from_bool(active.client.release(resource_id, owner))
        });
        Ok(outcome.unwrap_or(OperResult::Unhandled))
    }

    fn before_is_locked(&self, resource_id: &str) -> Result<OperResult> {
        let outcome =
            self.with_active(|active| OperResult::from_bool(active.client.is_locked(resource_id)));
        Ok(outcome.unwrap_or(OperResult::Unhandled))
    }

    fn before_is_locked_by(&self, resource_id: &str, owner: &str) -> Result<OperResult> {
        let outcome = self.with_active(|active| {
            OperResult::from_bool(active.client.is_active(resource_id, owner))
        });
        Ok(outcome.unwrap_or(OperResult::Unhandled))
    }

    fn after_start(&self) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.is_some() {
            debug!("{FEATURE_NAME} already started");
            return Ok(());
        }

        let store = self.open_store().map_err(|err| self.start_error(err))?;
        store.ensure_schema().map_err(|err| self.start_error(err))?;

        if self.settings.purge_on_start {
            match LockHygieneRunner::new(&store, self.settings.purge_grace).run() {
                Ok(report) if report.removed > 0 => {
                    info!("Purged {} long-expired lock row(s)", report.removed)
                }
                Ok(_) => {}
                Err(err) => warn!("Lock hygiene sweep failed: {err}"),
            }
        }

        let client = Arc::new(TargetLockClient::new(store, self.settings.host.clone()));
        let heartbeat = HeartbeatScheduler::with_observer(
            Arc::clone(&client),
            self.settings.heartbeat_interval,
            Arc::clone(&self.loss_observer),
        );
        heartbeat.start().map_err(|err| self.start_error(err))?;

        info!(
            "{FEATURE_NAME} started on {} as host {}",
            client.store().location(),
            client.host()
        );
        *state = Some(ActiveState { client, heartbeat });
        Ok(())
    }

    fn before_shutdown(&self) {
        let active = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(active) = active {
            active.heartbeat.stop();
            let abandoned = active.heartbeat.held().len();
            if abandoned > 0 {
                debug!("{abandoned} lock(s) will expire without renewal");
            }
            info!("{FEATURE_NAME} stopped");
        }
    }
}

impl Drop for DistributedLockingFeature {
    fn drop(&mut self) {
        self.before_shutdown();
    }
}
