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
use crate::locking::cancellation::{StopReason, StopToken, signal_stop_token};
use colored::*;
use log::{info, warn};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct HoldCommand<'a> {
    config: &'a DistLockConfig,
    lock_timeout: Option<&'a str>,
}

impl<'a> HoldCommand<'a> {
    pub fn new(config: &'a DistLockConfig, lock_timeout: Option<&'a str>) -> Result<Self> {
        Ok(Self {
            config,
            lock_timeout,
        })
    }

    /// Acquires `resource` and keeps it alive with the heartbeat until the
    /// process receives SIGINT or SIGTERM, then releases it.
    pub fn execute(&self, resource: &str, owner: Option<&str>, hold_secs: Option<u64>) -> Result<()> {
        self.execute_until(resource, owner, hold_secs, &signal_stop_token())
    }

    pub(crate) fn execute_until(
        &self,
        resource: &str,
        owner: Option<&str>,
        hold_secs: Option<u64>,
        stop: &StopToken,
    ) -> Result<()> {
        let session = LockSession::open(self.config, self.lock_timeout)?;
        let owner = match owner {
            Some(owner) => owner.to_string(),
            None => generated_owner(&session.feature().settings().host),
        };
        let hold_secs = hold_secs.unwrap_or(0);

        if !session.manager().lock(resource, &owner, hold_secs)? {
            return Err(DistLockError::LockNotHeld(resource.to_string()));
        }

        println!(
            "{} Holding {} as {} (Ctrl-C to release)",
            "✓".green().bold(),
            resource.bold(),
            owner
        );

        while !stop.is_stopped() {
            let still_held = session
                .feature()
                .held()
                .iter()
                .any(|lock| lock.resource_id == resource && lock.owner == owner);
            if !still_held {
                warn!("Lost lock on {resource} while holding it");
                return Err(DistLockError::LockNotHeld(resource.to_string()));
            }
            thread::sleep(POLL_INTERVAL);
        }

        let reason = stop.reason().unwrap_or(StopReason::Requested);
        info!("Releasing {resource} for {owner} ({reason})");
        if !session.manager().unlock(resource, &owner)? {
            return Err(DistLockError::LockNotHeld(resource.to_string()));
        }
        println!("{} Released {}", "✓".green().bold(), resource.bold());
        Ok(())
    }
}

fn generated_owner(host: &str) -> String {
    format!("{host}-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generated_owners_are_unique() {
        let first = generated_owner("node");
        let second = generated_owner("node");
        assert!(first.starts_with("node-"));
        assert_ne!(first, second);
    }

    #[test]
    fn cancelled_hold_releases_lock() {
        let temp_dir = TempDir::new().unwrap();
        let config = DistLockConfig::new(temp_dir.path().to_path_buf());
        let stop = StopToken::new();
        stop.stop();

        let command = HoldCommand::new(&config, None).unwrap();
        command
            .execute_until("resource1", Some("owner1"), Some(30), &stop)
            .unwrap();

        let session = LockSession::open(&config, None).unwrap();
        assert!(session.client().unwrap().row("resource1").is_none());
    }

    #[test]
    fn hold_refuses_taken_resource() {
        let temp_dir = TempDir::new().unwrap();
        let config = DistLockConfig::new(temp_dir.path().to_path_buf());
        let session = LockSession::open(&config, None).unwrap();
        assert!(session.manager().lock("resource1", "owner1", 60).unwrap());

        let stop = StopToken::new();
        stop.stop();
        let command = HoldCommand::new(&config, None).unwrap();
        let err = command
            .execute_until("resource1", Some("owner2"), None, &stop)
            .unwrap_err();
        assert!(matches!(err, DistLockError::LockNotHeld(_)));
    }
}
