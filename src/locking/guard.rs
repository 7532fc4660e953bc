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

use crate::error::Result;
use crate::locking::manager::PolicyResourceLockManager;
use log::warn;

/// RAII guard that unlocks a resource through its manager when dropped.
pub struct ResourceLockGuard<'a> {
    manager: &'a PolicyResourceLockManager,
    resource_id: String,
    owner: String,
    released: bool,
}

impl<'a> ResourceLockGuard<'a> {
    pub(crate) fn new(manager: &'a PolicyResourceLockManager, resource_id: &str, owner: &str) -> Self {
        Self {
            manager,
            resource_id: resource_id.to_string(),
            owner: owner.to_string(),
            released: false,
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Unlocks now and reports whether the unlock was granted.
    pub fn release(mut self) -> Result<bool> {
        self.released = true;
        self.manager.unlock(&self.resource_id, &self.owner)
    }
}

impl Drop for ResourceLockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.manager.unlock(&self.resource_id, &self.owner) {
            Ok(true) => {}
            Ok(false) => warn!(
                "Lock on {} for {} was already gone when its guard dropped",
                self.resource_id, self.owner
            ),
            Err(err) => warn!("Failed to unlock {}: {err}", self.resource_id),
        }
    }
}
