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

pub mod hold;
pub mod list;
pub mod lock;
pub mod purge;
pub mod refresh;
pub mod status;
pub mod unlock;

use crate::config::DistLockConfig;
use crate::error::{DistLockError, Result};
use crate::locking::client::TargetLockClient;
use crate::locking::distributed::{DistributedLockingFeature, DistributedLockingSettings};
use crate::locking::feature::LockFeature;
use crate::locking::manager::PolicyResourceLockManager;
use crate::locking::timeout::LockTimeoutResolution;
use log::debug;
use std::sync::Arc;

/// Lock manager wired to the shared store for the lifetime of one command.
///
/// The distributed feature is started eagerly so that a store that cannot be
/// opened fails the command instead of silently falling back to the
/// in-process map. Dropping the session stops the heartbeat.
pub struct LockSession {
    manager: PolicyResourceLockManager,
    feature: Arc<DistributedLockingFeature>,
    wait: LockTimeoutResolution,
}

impl LockSession {
    pub fn open(config: &DistLockConfig, lock_timeout: Option<&str>) -> Result<Self> {
        let wait = config.locking.resolve_wait_timeout(lock_timeout)?;
        debug!(
            "Store round trips wait up to {} ({})",
            wait.value, wait.source
        );

        let settings =
            DistributedLockingSettings::from_config(config).with_wait_timeout(wait.value);
        let feature = Arc::new(DistributedLockingFeature::new(settings));
        feature.after_start()?;

        let mut manager = PolicyResourceLockManager::new();
        manager.register(Arc::clone(&feature) as Arc<dyn LockFeature>);
        manager.start();

        Ok(Self {
            manager,
            feature,
            wait,
        })
    }

    pub fn manager(&self) -> &PolicyResourceLockManager {
        &self.manager
    }

    pub fn feature(&self) -> &DistributedLockingFeature {
        &self.feature
    }

    pub fn wait(&self) -> LockTimeoutResolution {
        self.wait
    }

    pub fn client(&self) -> Result<Arc<TargetLockClient>> {
        self.feature.client().ok_or_else(|| {
            DistLockError::SystemError("Distributed locking is not running".to_string())
        })
    }
}

impl Drop for LockSession {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}
