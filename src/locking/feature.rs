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

//! Interception contract between the lock manager and pluggable features.
//!
//! Every hook has a default that leaves the decision to the next feature
//! (or to the manager's built-in policy), so an implementation only
//! overrides the operations it cares about.

use crate::error::Result;

/// Verdict of a `before_*` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperResult {
    Accepted,
    Denied,
    Unhandled,
}

impl OperResult {
    pub fn from_bool(value: bool) -> Self {
        if value {
            OperResult::Accepted
        } else {
            OperResult::Denied
        }
    }

    /// `Some(true|false)` for a decisive verdict, `None` for [`OperResult::Unhandled`].
    pub fn verdict(self) -> Option<bool> {
        match self {
            OperResult::Accepted => Some(true),
            OperResult::Denied => Some(false),
            OperResult::Unhandled => None,
        }
    }
}

/// A feature registered with the
/// [`PolicyResourceLockManager`](crate::locking::manager::PolicyResourceLockManager).
///
/// `before_*` hooks may decide an operation outright. `after_*` hooks observe
/// the result of the built-in policy and return `true` to stop the
/// notification from reaching later features. Returning an error from any
/// hook is treated like [`OperResult::Unhandled`] (or, for `after_*`, like
/// `false`).
pub trait LockFeature: Send + Sync {
    fn name(&self) -> &str {
        "lock-feature"
    }

    fn before_lock(&self, _resource_id: &str, _owner: &str, _hold_secs: u64) -> Result<OperResult> {
        Ok(OperResult::Unhandled)
    }

    fn after_lock(&self, _resource_id: &str, _owner: &str, _locked: bool) -> Result<bool> {
        Ok(false)
    }

    fn before_refresh(
        &self,
        _resource_id: &str,
        _owner: &str,
        _hold_secs: u64,
    ) -> Result<OperResult> {
        Ok(OperResult::Unhandled)
    }

    fn after_refresh(&self, _resource_id: &str, _owner: &str, _refreshed: bool) -> Result<bool> {
        Ok(false)
    }

    fn before_unlock(&self, _resource_id: &str, _owner: &str) -> Result<OperResult> {
        Ok(OperResult::Unhandled)
    }

    fn after_unlock(&self, _resource_id: &str, _owner: &str, _unlocked: bool) -> Result<bool> {
        Ok(false)
    }

    fn before_is_locked(&self, _resource_id: &str) -> Result<OperResult> {
        Ok(OperResult::Unhandled)
    }

    fn before_is_locked_by(&self, _resource_id: &str, _owner: &str) -> Result<OperResult> {
        Ok(OperResult::Unhandled)
    }

    /// Called once the hosting engine is up.
    fn after_start(&self) -> Result<()> {
        Ok(())
    }

    /// Called before the hosting engine stops. Must tolerate repeated calls.
    fn before_shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passive;

    impl LockFeature for Passive {}

    #[test]
    fn default_hooks_leave_decisions_to_others() {
        let feature = Passive;
        assert_eq!(
            feature.before_lock("r", "o", 0).unwrap(),
            OperResult::Unhandled
        );
        assert_eq!(
            feature.before_refresh("r", "o", 0).unwrap(),
            OperResult::Unhandled
        );
        assert_eq!(feature.before_unlock("r", "o").unwrap(), OperResult::Unhandled);
        assert_eq!(feature.before_is_locked("r").unwrap(), OperResult::Unhandled);
        assert_eq!(
            feature.before_is_locked_by("r", "o").unwrap(),
            OperResult::Unhandled
        );
        assert!(!feature.after_lock("r", "o", true).unwrap());
        assert!(!feature.after_refresh("r", "o", true).unwrap());
        assert!(!feature.after_unlock("r", "o", true).unwrap());
        feature.after_start().unwrap();
        feature.before_shutdown();
    }

    #[test]
    fn verdict_mapping() {
        assert_eq!(OperResult::from_bool(true), OperResult::Accepted);
        assert_eq!(OperResult::from_bool(false), OperResult::Denied);
        assert_eq!(OperResult::Accepted.verdict(), Some(true));
        assert_eq!(OperResult::Denied.verdict(), Some(false));
        assert_eq!(OperResult::Unhandled.verdict(), None);
    }
}
