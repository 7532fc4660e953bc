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
use colored::*;

pub struct UnlockCommand<'a> {
    config: &'a DistLockConfig,
    lock_timeout: Option<&'a str>,
}

impl<'a> UnlockCommand<'a> {
    pub fn new(config: &'a DistLockConfig, lock_timeout: Option<&'a str>) -> Result<Self> {
        Ok(Self {
            config,
            lock_timeout,
        })
    }

    pub fn execute(&self, resource: &str, owner: &str) -> Result<()> {
        let session = LockSession::open(self.config, self.lock_timeout)?;

        if !session.manager().unlock(resource, owner)? {
            return Err(DistLockError::LockNotHeld(resource.to_string()));
        }

        println!("{} Released {}", "✓".green().bold(), resource.bold());
        Ok(())
    }
}
