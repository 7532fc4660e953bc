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

//! Durable lock rows in a shared relational table.
//!
//! Every process that coordinates through the same database file opens its
//! own [`LockStore`]. Cross-process exclusion relies on SQLite executing each
//! single-statement INSERT/UPDATE/DELETE atomically; the store never holds a
//! transaction open across calls.
//!
//! ```sql
//! CREATE TABLE locks (
//!   resourceId      VARCHAR(128) PRIMARY KEY,
//!   host            VARCHAR(128),
//!   owner           VARCHAR(128),
//!   expirationTime  BIGINT
//! );
//! ```

use crate::error::{DistLockError, Result};
use crate::locking::record::LockRow;
use log::debug;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Width of the `resourceId`, `host` and `owner` columns, in characters.
pub const MAX_ID_CHARS: usize = 128;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS locks (
  resourceId      VARCHAR(128) PRIMARY KEY,
  host            VARCHAR(128),
  owner           VARCHAR(128),
  expirationTime  BIGINT
);
"#;

const SELECT_COLUMNS: &str = "SELECT resourceId, host, owner, expirationTime FROM locks";

pub struct LockStore {
    conn: Mutex<Connection>,
    location: String,
}

impl std::fmt::Debug for LockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockStore")
            .field("location", &self.location)
            .finish()
    }
}

impl LockStore {
    /// Opens (creating if needed) the database file shared by cooperating processes.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| {
                DistLockError::Storage(format!(
                    "Failed to ensure parent directory {} exists: {err}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!(
            "Opened lock store at {} (journal mode {journal_mode})",
            path.display()
        );

        Ok(Self {
            conn: Mutex::new(conn),
            location: path.display().to_string(),
        })
    }

    /// Private, process-local database. Useful for tests and single-node setups.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            location: ":memory:".to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn ensure_schema(&self) -> Result<()> {
        self.connection()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Inserts `row` unless a row for the same resource already exists.
    ///
    /// Returns `false` on a primary-key conflict instead of failing.
    pub fn insert_if_absent(&self, row: &LockRow) -> Result<bool> {
        let inserted = self.connection()?.execute(
            "INSERT INTO locks (resourceId, host, owner, expirationTime) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(resourceId) DO NOTHING",
            params![row.resource_id, row.host, row.owner, row.expiration_time],
        )?;
        Ok(inserted == 1)
    }

    pub fn select(&self, resource_id: &str) -> Result<Option<LockRow>> {
        let conn = self.connection()?;
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE resourceId = ?1"),
                params![resource_id],
                row_to_lock,
            )
            .optional()?;
        Ok(row)
    }

    /// Takes over a stale row. The `expirationTime < now` guard is evaluated by
    /// the UPDATE itself, so of several concurrent stealers exactly one wins.
    pub fn steal_if_expired(&self, row: &LockRow, now_ms: i64) -> Result<bool> {
        let updated = self.connection()?.execute(
            "UPDATE locks SET host = ?1, owner = ?2, expirationTime = ?3 \
             WHERE resourceId = ?4 AND expirationTime < ?5",
            params![
                row.host,
                row.owner,
                row.expiration_time,
                row.resource_id,
                now_ms
            ],
        )?;
        Ok(updated == 1)
    }

    /// Moves the deadline of a row still owned by `owner`, expired or not.
    pub fn extend(&self, resource_id: &str, owner: &str, expiration_time: i64) -> Result<bool> {
        let updated = self.connection()?.execute(
            "UPDATE locks SET expirationTime = ?1 WHERE resourceId = ?2 AND owner = ?3",
            params![expiration_time, resource_id, owner],
        )?;
        Ok(updated == 1)
    }

    pub fn delete(&self, resource_id: &str, owner: &str) -> Result<bool> {
        let deleted = self.connection()?.execute(
            "DELETE FROM locks WHERE resourceId = ?1 AND owner = ?2",
            params![resource_id, owner],
        )?;
        Ok(deleted == 1)
    }

    pub fn is_active(&self, resource_id: &str, owner: &str, now_ms: i64) -> Result<bool> {
        let conn = self.connection()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM locks WHERE resourceId = ?1 AND owner = ?2 AND expirationTime >= ?3",
                params![resource_id, owner, now_ms],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list(&self) -> Result<Vec<LockRow>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY resourceId"))?;
        let rows = stmt
            .query_map([], row_to_lock)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Deletes rows whose deadline lies before `cutoff_ms`. Returns the number removed.
    pub fn purge_expired_before(&self, cutoff_ms: i64) -> Result<usize> {
        let removed = self.connection()?.execute(
            "DELETE FROM locks WHERE expirationTime < ?1",
            params![cutoff_ms],
        )?;
        Ok(removed)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            DistLockError::Storage(format!(
                "Connection to lock store {} is poisoned",
                self.location
            ))
        })
    }
}

fn row_to_lock(row: &Row<'_>) -> rusqlite::Result<LockRow> {
    Ok(LockRow {
        resource_id: row.get(0)?,
        host: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        owner: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        expiration_time: row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
    })
}
