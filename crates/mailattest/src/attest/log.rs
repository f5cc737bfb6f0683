//! Per-account processing log: the user-visible history of every attempt.

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::log_repo::{self, NewLogRow};
use crate::db::{Database, DatabaseError};

/// Number of entries an account log holds before it is truncated.
pub const DEFAULT_MAX_LOG_ENTRIES: u32 = 100;

/// One recorded processing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub attempt: u32,
    pub packet: String,
    pub success: bool,
    pub result: String,
    pub created_at: String,
}

impl LogEntry {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// What an append did to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Appended {
    /// The entry was stored.
    Stored(LogEntry),
    /// The log was full; it now holds only the truncation sentinel and the
    /// new entry was dropped.
    Truncated { deleted: u64 },
}

/// Append-only, size-capped log keyed by account.
#[derive(Clone)]
pub struct ProcessingLog {
    db: Database,
    max_entries: u32,
}

impl ProcessingLog {
    pub fn new(db: Database, max_entries: u32) -> Self {
        Self {
            db,
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> u32 {
        self.max_entries
    }

    /// Appends an entry for `account`.
    pub fn append(
        &self,
        account: &str,
        packet: &str,
        success: bool,
        result: &str,
    ) -> Result<Appended, DatabaseError> {
        self.db
            .with_tx(|tx| self.append_in(tx, account, packet, success, result))
    }

    /// Appends using an existing connection so the caller can group the
    /// write with other statements in one transaction.
    pub(crate) fn append_in(
        &self,
        conn: &Connection,
        account: &str,
        packet: &str,
        success: bool,
        result: &str,
    ) -> Result<Appended, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let count = log_repo::count_by_account(conn, account)?;

        if count >= self.max_entries {
            let deleted = log_repo::delete_by_account(conn, account)?;
            let sentinel = format!("DELETED {} LOGS", deleted);
            log_repo::insert(
                conn,
                &NewLogRow {
                    account,
                    attempt: 1,
                    packet: "",
                    success: false,
                    result: &sentinel,
                    created_at: &now,
                },
            )?;
            info!("Attest log for {} truncated ({} entries)", account, deleted);
            return Ok(Appended::Truncated { deleted });
        }

        let attempt = count + 1;
        log_repo::insert(
            conn,
            &NewLogRow {
                account,
                attempt,
                packet,
                success,
                result,
                created_at: &now,
            },
        )?;
        debug!(
            "Attest log for {}: attempt {} success={} result={}",
            account, attempt, success, result
        );

        Ok(Appended::Stored(LogEntry {
            attempt,
            packet: packet.to_string(),
            success,
            result: result.to_string(),
            created_at: now,
        }))
    }

    /// Returns the log for `account`, oldest first.
    pub fn entries(&self, account: &str) -> Result<Vec<LogEntry>, DatabaseError> {
        Ok(log_repo::find_by_account(&self.db, account)?
            .into_iter()
            .map(|row| LogEntry {
                attempt: row.attempt,
                packet: row.packet,
                success: row.success,
                result: row.result,
                created_at: row.created_at,
            })
            .collect())
    }
}
