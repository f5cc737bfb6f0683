//! Per-account attester sets: which attestations were requested and which
//! have been completed.

use std::collections::BTreeSet;

use chrono::Utc;
use log::{debug, info};
use serde::Serialize;

use crate::db::state_repo::{self, AttestStatus};
use crate::db::{Database, DatabaseError};

use super::log::{Appended, ProcessingLog};

/// Snapshot of an account's attestation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttestationState {
    pub requested: BTreeSet<String>,
    pub processed: BTreeSet<String>,
}

impl AttestationState {
    pub fn is_processed(&self, attester: &str) -> bool {
        self.processed.contains(attester)
    }
}

/// Result of recording a successful confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The attester moved to `processed` and the success entry was logged.
    Transitioned(Appended),
    /// The attester was already processed; nothing was written.
    AlreadyProcessed,
}

/// Persisted `requested` / `processed` sets keyed by account.
#[derive(Clone)]
pub struct StateTracker {
    db: Database,
}

impl StateTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds `attester` to the requested set. Returns `false` if the attester
    /// was already requested or already processed.
    pub fn request(&self, account: &str, attester: &str) -> Result<bool, DatabaseError> {
        let inserted =
            state_repo::insert_requested(&self.db, account, attester, &Utc::now().to_rfc3339())?;
        if inserted {
            info!("Attestation by {} requested for {}", attester, account);
        }
        Ok(inserted)
    }

    pub fn requested(&self, account: &str) -> Result<BTreeSet<String>, DatabaseError> {
        Ok(state_repo::find_by_status(&self.db, account, AttestStatus::Requested)?
            .into_iter()
            .collect())
    }

    pub fn processed(&self, account: &str) -> Result<BTreeSet<String>, DatabaseError> {
        Ok(state_repo::find_by_status(&self.db, account, AttestStatus::Processed)?
            .into_iter()
            .collect())
    }

    pub fn state(&self, account: &str) -> Result<AttestationState, DatabaseError> {
        let mut state = AttestationState::default();
        for row in state_repo::find_by_account(&self.db, account)? {
            match row.status {
                AttestStatus::Requested => state.requested.insert(row.attester),
                AttestStatus::Processed => state.processed.insert(row.attester),
            };
        }
        Ok(state)
    }

    /// Moves `attester` to `processed` and appends the success entry in one
    /// transaction. Repeated calls for the same attester write nothing.
    pub fn complete(
        &self,
        log: &ProcessingLog,
        account: &str,
        attester: &str,
        packet: &str,
        message: &str,
    ) -> Result<Completion, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_tx(|tx| {
            if !state_repo::mark_processed(tx, account, attester, &now)? {
                debug!("{} already processed for {}", attester, account);
                return Ok(Completion::AlreadyProcessed);
            }
            let appended = log.append_in(tx, account, packet, true, message)?;
            Ok(Completion::Transitioned(appended))
        })
    }
}
