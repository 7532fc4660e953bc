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

use crate::config::DistLockConfig;
use crate::error::Result;
use crate::locking::hygiene::LockHygieneRunner;
use crate::locking::store::LockStore;
use colored::*;
use std::time::Duration;

pub struct PurgeCommand<'a> {
    config: &'a DistLockConfig,
}

impl<'a> PurgeCommand<'a> {
    pub fn new(config: &'a DistLockConfig) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn execute(&self, grace_secs: Option<u64>) -> Result<()> {
        let locking = &self.config.locking;
        let store = LockStore::open(&self.config.database_path(), locking.busy_timeout())?;
        store.ensure_schema()?;

        let grace = grace_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| locking.purge_grace());
        let report = LockHygieneRunner::new(&store, grace).run()?;

        println!(
            "{} Removed {} row{} expired for more than {}s",
            "✓".green().bold(),
            report.removed,
            if report.removed == 1 { "" } else { "s" },
            grace.as_secs()
        );
        Ok(())
    }
}
