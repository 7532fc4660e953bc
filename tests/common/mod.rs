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

use distlock::locking::distributed::{DistributedLockingFeature, DistributedLockingSettings};
use distlock::locking::feature::LockFeature;
use distlock::locking::manager::PolicyResourceLockManager;
use distlock::locking::store::LockStore;
use distlock::locking::timeout::LockTimeoutValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub fn settings(database: &Path, host: &str) -> DistributedLockingSettings {
    DistributedLockingSettings {
        database: database.to_path_buf(),
        host: host.to_string(),
        default_hold: Duration::from_secs(60),
        heartbeat_interval: Duration::from_secs(20),
        wait_timeout: LockTimeoutValue::from_secs(10),
        busy_timeout: Duration::from_secs(5),
        purge_on_start: false,
        purge_grace: Duration::from_secs(600),
    }
}

/// One simulated process: its own connection, feature, and manager.
pub struct Node {
    pub feature: Arc<DistributedLockingFeature>,
    pub manager: PolicyResourceLockManager,
}

impl Node {
    pub fn start(database: &Path, host: &str) -> Self {
        Self::start_with(settings(database, host))
    }

    pub fn start_with(settings: DistributedLockingSettings) -> Self {
        let feature = Arc::new(DistributedLockingFeature::new(settings));
        let mut manager = PolicyResourceLockManager::new();
        manager.register(Arc::clone(&feature) as Arc<dyn LockFeature>);
        manager.start();
        assert!(feature.is_started(), "distributed feature failed to start");
        Self { feature, manager }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}

pub fn database_in(dir: &Path) -> PathBuf {
    dir.join("locks.db")
}

pub fn open_store(database: &Path) -> LockStore {
    let store = LockStore::open(database, Duration::from_secs(5)).unwrap();
    store.ensure_schema().unwrap();
    store
}
