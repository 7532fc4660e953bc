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
use crate::error::Result;
use crate::locking::record::{LockRow, now_millis};
use chrono::SecondsFormat;
use colored::*;
use serde::Serialize;

#[derive(Serialize)]
struct StatusOutput<'a> {
    resource: &'a str,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    row: Option<&'a LockRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    held_by_owner: Option<bool>,
}

pub struct StatusCommand<'a> {
    config: &'a DistLockConfig,
    lock_timeout: Option<&'a str>,
}

impl<'a> StatusCommand<'a> {
    pub fn new(config: &'a DistLockConfig, lock_timeout: Option<&'a str>) -> Result<Self> {
        Ok(Self {
            config,
            lock_timeout,
        })
    }

    pub fn execute(&self, resource: &str, owner: Option<&str>, json: bool) -> Result<()> {
        let session = LockSession::open(self.config, self.lock_timeout)?;
        let row = session.client()?.row(resource);
        let held_by_owner = owner
            .map(|owner| session.manager().is_locked_by(resource, owner))
            .transpose()?;

        let output = StatusOutput {
            resource,
            state: row_state(row.as_ref(), now_millis()),
            row: row.as_ref(),
            expires_at: row.as_ref().and_then(format_expiry),
            held_by_owner,
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        match output.row {
            None => println!("{} is {}", resource.bold(), "unlocked".green()),
            Some(row) => {
                let state = match output.state {
                    "locked" => output.state.red().bold(),
                    _ => output.state.yellow(),
                };
                println!("{} is {state}", resource.bold());
                println!("  Owner:   {}", row.owner);
                println!("  Host:    {}", row.host);
                println!(
                    "  Expires: {}",
                    output.expires_at.as_deref().unwrap_or("unknown")
                );
            }
        }
        if let (Some(owner), Some(held)) = (owner, held_by_owner) {
            let verdict = if held { "yes".green() } else { "no".red() };
            println!("  Held by {owner}: {verdict}");
        }
        Ok(())
    }
}

/// `unlocked` without a row, `expired` once the lease has lapsed, else `locked`.
pub(crate) fn row_state(row: Option<&LockRow>, now_ms: i64) -> &'static str {
    match row {
        None => "unlocked",
        Some(row) if row.is_expired_at(now_ms) => "expired",
        Some(_) => "locked",
    }
}

pub(crate) fn format_expiry(row: &LockRow) -> Option<String> {
    row.expires_at()
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_state() {
        let row = LockRow::new("r", "h", "o", 1_000);
        assert_eq!(row_state(None, 0), "unlocked");
        assert_eq!(row_state(Some(&row), 1_000), "locked");
        assert_eq!(row_state(Some(&row), 1_001), "expired");
    }

    #[test]
    fn test_format_expiry() {
        let row = LockRow::new("r", "h", "o", 0);
        assert_eq!(format_expiry(&row).unwrap(), "1970-01-01T00:00:00Z");
    }
}
