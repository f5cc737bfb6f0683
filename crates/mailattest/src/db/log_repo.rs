//! Processing log repository: operations on the `attest_log` table.

use rusqlite::{params, Connection};

use super::{Database, DatabaseError};

/// A raw log row from the database.
#[derive(Debug, Clone)]
pub struct LogRow {
    pub id: i64,
    pub account: String,
    pub attempt: u32,
    pub packet: String,
    pub success: bool,
    pub result: String,
    pub created_at: String,
}

/// A log row that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewLogRow<'a> {
    pub account: &'a str,
    pub attempt: u32,
    pub packet: &'a str,
    pub success: bool,
    pub result: &'a str,
    pub created_at: &'a str,
}

/// Inserts a log row and returns its id.
pub fn insert(conn: &Connection, row: &NewLogRow<'_>) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO attest_log (account, attempt, packet, success, result, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.account,
            row.attempt,
            row.packet,
            row.success,
            row.result,
            row.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Counts log rows for an account.
pub fn count_by_account(conn: &Connection, account: &str) -> Result<u32, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM attest_log WHERE account = ?1",
        params![account],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// Deletes every log row for an account. Returns the number of rows deleted.
pub fn delete_by_account(conn: &Connection, account: &str) -> Result<u64, DatabaseError> {
    let count = conn.execute(
        "DELETE FROM attest_log WHERE account = ?1",
        params![account],
    )?;
    Ok(count as u64)
}

/// Returns all log rows for an account in insertion order.
pub fn find_by_account(db: &Database, account: &str) -> Result<Vec<LogRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, account, attempt, packet, success, result, created_at
             FROM attest_log WHERE account = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![account], |row| {
                Ok(LogRow {
                    id: row.get(0)?,
                    account: row.get(1)?,
                    attempt: row.get(2)?,
                    packet: row.get(3)?,
                    success: row.get(4)?,
                    result: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
