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

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// One row of the `locks` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockRow {
    pub resource_id: String,
    pub host: String,
    pub owner: String,
    /// Lease deadline in epoch milliseconds.
    pub expiration_time: i64,
}

impl LockRow {
    pub fn new(
        resource_id: impl Into<String>,
        host: impl Into<String>,
        owner: impl Into<String>,
        expiration_time: i64,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            host: host.into(),
            owner: owner.into(),
            expiration_time,
        }
    }

    /// A row is stale once its deadline is strictly in the past.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expiration_time < now_ms
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.expiration_time)
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Computes `now + lease` in epoch millis without overflowing.
pub fn deadline_after(now_ms: i64, lease: Duration) -> i64 {
    let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_add(lease_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_strict() {
        let row = LockRow::new("resource1", "host", "owner1", 1_000);
        assert!(!row.is_expired_at(999));
        assert!(!row.is_expired_at(1_000));
        assert!(row.is_expired_at(1_001));
    }

    #[test]
    fn deadline_saturates() {
        assert_eq!(deadline_after(1_000, Duration::from_secs(2)), 3_000);
        assert_eq!(deadline_after(i64::MAX - 1, Duration::from_secs(1)), i64::MAX);
        assert_eq!(deadline_after(5, Duration::MAX), i64::MAX);
    }

    #[test]
    fn expires_at_converts_millis() {
        let row = LockRow::new("r", "h", "o", 1_700_000_000_123);
        let at = row.expires_at().unwrap();
        assert_eq!(at.timestamp_millis(), 1_700_000_000_123);
    }
}
