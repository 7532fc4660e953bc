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

use crate::commands::LockSession;
use crate::config::DistLockConfig;
use crate::error::{DistLockError, Result};
use crate::locking::acquisition::{LockWait, RetrySchedule};
use crate::locking::cancellation::signal_stop_token;
use crate::locking::timeout::{LockTimeoutSource, parse_timeout_override};
use crate::locking::wait_observer::StderrWaitObserver;
use colored::*;

pub struct LockCommand<'a> {
    config: &'a DistLockConfig,
    lock_timeout: Option<&'a str>,
}

impl<'a> LockCommand<'a> {
    pub fn new(config: &'a DistLockConfig, lock_timeout: Option<&'a str>) -> Result<Self> {
        Ok(Self {
            config,
            lock_timeout,
        })
    }

    /// Takes a lease on `resource`. With `wait`, keeps retrying until the
    /// resource frees up, the wait runs out, or the process is interrupted.
    pub fn execute(
        &self,
        resource: &str,
        owner: &str,
        hold_secs: Option<u64>,
        wait: Option<&str>,
    ) -> Result<()> {
        let session = LockSession::open(self.config, self.lock_timeout)?;
        let hold_secs = hold_secs.unwrap_or(0);
        let lease = session.feature().settings().lease_for(hold_secs);

        let locked = match wait {
            None => session.manager().lock(resource, owner, hold_secs)?,
            Some(raw) => {
                let budget = parse_timeout_override(raw)
                    .map_err(|err| DistLockError::InvalidArgument(err.to_string()))?;
                let observer = StderrWaitObserver::new();
                let mut lock_wait = LockWait::new(resource, budget)
                    .timeout_from(LockTimeoutSource::Cli)
                    .schedule(RetrySchedule::for_lease(lease))
                    .stop_on(signal_stop_token())
                    .observed_by(&observer);
                session
                    .manager()
                    .lock_with_wait(owner, hold_secs, &mut lock_wait)?
            }
        };

        if !locked {
            return Err(DistLockError::LockNotHeld(resource.to_string()));
        }

        println!(
            "{} Locked {} for {} ({}s lease)",
            "✓".green().bold(),
            resource.bold(),
            owner,
            lease.as_secs()
        );
        Ok(())
    }
}
