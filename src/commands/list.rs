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
use crate::commands::status::{format_expiry, row_state};
use crate::config::DistLockConfig;
use crate::error::Result;
use crate::locking::record::now_millis;
use comfy_table::{Cell, Color, Table, presets::UTF8_FULL};

pub struct ListCommand<'a> {
    config: &'a DistLockConfig,
    lock_timeout: Option<&'a str>,
}

impl<'a> ListCommand<'a> {
    pub fn new(config: &'a DistLockConfig, lock_timeout: Option<&'a str>) -> Result<Self> {
        Ok(Self {
            config,
            lock_timeout,
        })
    }

    pub fn execute(&self, json: bool) -> Result<()> {
        let session = LockSession::open(self.config, self.lock_timeout)?;
        let rows = session.client()?.rows();

        if json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        if rows.is_empty() {
            println!("No lock rows");
            return Ok(());
        }

        let now = now_millis();
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Resource", "Owner", "Host", "Expires", "State"]);

        for row in &rows {
            let state = row_state(Some(row), now);
            let color = if state == "locked" {
                Color::Red
            } else {
                Color::Yellow
            };
            table.add_row(vec![
                Cell::new(&row.resource_id),
                Cell::new(&row.owner),
                Cell::new(&row.host),
                Cell::new(format_expiry(row).unwrap_or_default()),
                Cell::new(state).fg(color),
            ]);
        }

        println!("{table}");
        println!(
            "{} row{}",
            rows.len(),
            if rows.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }
}
