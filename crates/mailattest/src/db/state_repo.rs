//! Attestation state repository: operations on the `attest_state` table.
//!
//! Each `(account, attester)` pair is a single row whose `status` is either
//! `requested` or `processed`, so an attester can never be in both sets.

use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Connection};

use super::{Database, DatabaseError};

/// Which of the two per-account sets an attester belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttestStatus {
    Requested,
    Processed,
}

impl AttestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttestStatus::Requested => "requested",
            AttestStatus::Processed => "processed",
        }
    }
}

impl fmt::Display for AttestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttestStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(AttestStatus::Requested),
            "processed" => Ok(AttestStatus::Processed),
            other => Err(DatabaseError::CorruptRow {
                table: "attest_state",
                reason: format!("unknown status '{}'", other),
            }),
        }
    }
}

/// A raw attestation state row from the database.
#[derive(Debug, Clone)]
pub struct StateRow {
    pub account: String,
    pub attester: String,
    pub status: AttestStatus,
    pub updated_at: String,
}

/// Records that `attester` was requested for `account`.
///
/// Returns `false` when a row already exists; an attester that has already
/// been processed is never moved back to `requested`.
pub fn insert_requested(
    db: &Database,
    account: &str,
    attester: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO attest_state (account, attester, status, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![account, attester, AttestStatus::Requested.as_str(), updated_at],
        )?;
        Ok(inserted > 0)
    })
}

/// Moves `attester` to `processed` for `account`.
///
/// Returns `true` only when the row actually changed. Calling it again for an
/// already processed attester is a no-op that returns `false`. Takes a bare
/// connection so it can run inside a caller's transaction.
pub fn mark_processed(
    conn: &Connection,
    account: &str,
    attester: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT INTO attest_state (account, attester, status, updated_at)
         VALUES (?1, ?2, 'processed', ?3)
         ON CONFLICT (account, attester) DO UPDATE
            SET status = 'processed', updated_at = excluded.updated_at
            WHERE attest_state.status <> 'processed'",
        params![account, attester, updated_at],
    )?;
    Ok(changed > 0)
}

/// Lists the attester ids in the given set for `account`, sorted by id.
pub fn find_by_status(
    db: &Database,
    account: &str,
    status: AttestStatus,
) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT attester FROM attest_state
             WHERE account = ?1 AND status = ?2
             ORDER BY attester",
        )?;
        let rows = stmt
            .query_map(params![account, status.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns every state row for `account`.
pub fn find_by_account(db: &Database, account: &str) -> Result<Vec<StateRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT account, attester, status, updated_at FROM attest_state
             WHERE account = ?1 ORDER BY attester",
        )?;
        let raw = stmt
            .query_map(params![account], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(account, attester, status, updated_at)| {
                Ok(StateRow {
                    account,
                    attester,
                    status: status.parse()?,
                    updated_at,
                })
            })
            .collect()
    })
}
