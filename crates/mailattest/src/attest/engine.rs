//! The attestation synchronization engine.
//!
//! [`AttestEngine`] ties the collaborators together: it owns the watch
//! registry, and every watch tick runs [`AttestEngine::run_cycle`], which
//! fetches attest packets for the account, validates them, and hands valid
//! ones to the [`Submitter`].

use std::sync::{Arc, Weak};

use secrecy::SecretString;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::db::Database;
use crate::error::{AttestError, Result};

use super::collaborators::{AttestationApi, Crypto, KeyStore, MailboxQuery, PacketFetcher, PrimaryKey};
use super::error::{PacketError, RemoteError, StoreError};
use super::identity::AttesterRegistry;
use super::log::{LogEntry, ProcessingLog, DEFAULT_MAX_LOG_ENTRIES};
use super::packet::AttestPacket;
use super::scheduler::{WatchRegistry, WatchSchedule};
use super::state::{AttestationState, StateTracker};
use super::submitter::{SubmitOutcome, Submitter};
use super::validator::{validate, Rejection, Validation, ValidationContext};

/// Result entry written when an attester was already processed.
pub const MSG_ALREADY_ATTESTED: &str = "already attested";

/// The external services the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub key_store: Arc<dyn KeyStore>,
    pub crypto: Arc<dyn Crypto>,
    pub fetcher: Arc<dyn PacketFetcher>,
    pub api: Arc<dyn AttestationApi>,
}

/// Tunables of an engine instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub attesters: AttesterRegistry,
    pub schedule: WatchSchedule,
    pub max_log_entries: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            attesters: AttesterRegistry::default(),
            schedule: WatchSchedule::default(),
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
        }
    }
}

/// Why a cycle ended before fetching anything, without writing to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleSkip {
    NoPrimaryKey,
    NoPassphrase,
}

/// Why a cycle stopped early on a failure that will be retried next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleAbort {
    KeyStore(StoreError),
    Remote(RemoteError),
}

/// What happened to one fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketOutcome {
    ParseFailed(PacketError),
    Rejected(Rejection),
    AlreadyAttested,
    Submitted(SubmitOutcome),
}

impl PacketOutcome {
    /// Whether this outcome ends the watch for the account.
    pub fn stops_watch(&self) -> bool {
        matches!(
            self,
            PacketOutcome::AlreadyAttested | PacketOutcome::Submitted(SubmitOutcome::Attested(_))
        )
    }
}

/// Summary of one `run_cycle` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub account: String,
    pub skipped: Option<CycleSkip>,
    /// No requested attesters or no inbox access.
    pub cannot_fetch: bool,
    pub outcomes: Vec<PacketOutcome>,
    /// The cycle ended the watch. False when a restart replaced it meanwhile.
    pub stopped_watching: bool,
    pub aborted: Option<CycleAbort>,
}

impl CycleReport {
    fn new(account: &str) -> Self {
        Self {
            account: account.to_string(),
            skipped: None,
            cannot_fetch: false,
            outcomes: Vec::new(),
            stopped_watching: false,
            aborted: None,
        }
    }
}

struct EngineInner {
    key_store: Arc<dyn KeyStore>,
    fetcher: Arc<dyn PacketFetcher>,
    submitter: Submitter,
    state: StateTracker,
    log: ProcessingLog,
    attesters: AttesterRegistry,
    schedule: WatchSchedule,
    watches: WatchRegistry,
}

/// Per-account watcher for attest packets. Cheap to clone; clones share
/// the same watches and storage.
#[derive(Clone)]
pub struct AttestEngine {
    inner: Arc<EngineInner>,
}

impl AttestEngine {
    pub fn new(db: Database, collaborators: Collaborators, options: EngineOptions) -> Self {
        let state = StateTracker::new(db.clone());
        let log = ProcessingLog::new(db, options.max_log_entries);
        let submitter = Submitter::new(
            collaborators.crypto,
            collaborators.api,
            state.clone(),
            log.clone(),
        );

        Self {
            inner: Arc::new(EngineInner {
                key_store: collaborators.key_store,
                fetcher: collaborators.fetcher,
                submitter,
                state,
                log,
                attesters: options.attesters,
                schedule: options.schedule,
                watches: WatchRegistry::new(),
            }),
        }
    }

    /// Starts watching `account`, replacing any existing watch.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_watching(&self, account: &str) {
        let engine: Weak<EngineInner> = Arc::downgrade(&self.inner);
        self.inner
            .watches
            .start(account, self.inner.schedule, move |account, watch_id| {
                let engine = engine.clone();
                async move {
                    let Some(inner) = engine.upgrade() else {
                        return;
                    };
                    let engine = AttestEngine { inner };
                    if let Err(e) = engine.run_watch_cycle(&account, Some(watch_id)).await {
                        error!("Attest cycle for {} aborted: {}", account, e);
                    }
                }
            });
    }

    /// Stops watching `account`. Does nothing if it is not watched.
    pub fn stop_watching(&self, account: &str) {
        if !self.inner.watches.stop(account) {
            debug!("{} was not being watched", account);
        }
    }

    pub fn is_watching(&self, account: &str) -> bool {
        self.inner.watches.is_watching(account)
    }

    pub fn watched_accounts(&self) -> Vec<String> {
        self.inner.watches.watched()
    }

    /// Stops every watch.
    pub fn shutdown(&self) {
        self.inner.watches.stop_all();
    }

    /// Records that `account` asked `attester` for an attestation. Returns
    /// `false` if it was already requested or processed.
    pub fn request_attestation(&self, account: &str, attester: &str) -> Result<bool> {
        if !self.inner.attesters.contains(attester) {
            return Err(AttestError::UnknownAttester(attester.to_string()));
        }
        Ok(self.inner.state.request(account, attester)?)
    }

    pub fn state(&self, account: &str) -> Result<AttestationState> {
        Ok(self.inner.state.state(account)?)
    }

    /// The account's processing log, oldest first.
    pub fn log_entries(&self, account: &str) -> Result<Vec<LogEntry>> {
        Ok(self.inner.log.entries(account)?)
    }

    pub fn attesters(&self) -> &AttesterRegistry {
        &self.inner.attesters
    }

    /// Runs one check of `account`'s mailbox. Checks of the same account
    /// never overlap.
    ///
    /// Collaborator failures are reported in the returned [`CycleReport`]
    /// and the processing log; only storage failures are returned as errors.
    pub async fn run_cycle(&self, account: &str) -> Result<CycleReport> {
        self.run_watch_cycle(account, None).await
    }

    /// `watch_id` names the watch that scheduled this cycle; only that watch
    /// is stopped when the cycle ends it.
    async fn run_watch_cycle(&self, account: &str, watch_id: Option<u64>) -> Result<CycleReport> {
        let lock = self.inner.watches.cycle_lock(account);
        let _guard = lock.lock().await;
        self.cycle(account, watch_id)
            .instrument(info_span!("attest_cycle", account = %account, watch_id = ?watch_id))
            .await
    }

    /// Ends the watch on `account`. Returns false when a scheduled cycle's
    /// watch has already been replaced.
    fn end_watch(&self, account: &str, watch_id: Option<u64>) -> bool {
        match watch_id {
            Some(id) => self.inner.watches.stop_if(account, id),
            None => {
                self.stop_watching(account);
                true
            }
        }
    }

    async fn cycle(&self, account: &str, watch_id: Option<u64>) -> Result<CycleReport> {
        let inner = &self.inner;
        let mut report = CycleReport::new(account);

        let key = match inner.key_store.primary_key(account).await {
            Ok(Some(key)) => key,
            Ok(None) => {
                debug!("No primary key, skipping");
                report.skipped = Some(CycleSkip::NoPrimaryKey);
                return Ok(report);
            }
            Err(e) => {
                warn!("Key store unavailable: {}", e);
                report.aborted = Some(CycleAbort::KeyStore(e));
                return Ok(report);
            }
        };

        let passphrase = match inner.key_store.passphrase(account, &key).await {
            Ok(Some(passphrase)) => passphrase,
            Ok(None) => {
                debug!("No passphrase for {}, skipping", key.fingerprint());
                report.skipped = Some(CycleSkip::NoPassphrase);
                return Ok(report);
            }
            Err(e) => {
                warn!("Key store unavailable: {}", e);
                report.aborted = Some(CycleAbort::KeyStore(e));
                return Ok(report);
            }
        };

        let requested = inner.state.requested(account)?;
        if requested.is_empty() || !inner.fetcher.can_read_inbox(account).await {
            info!(
                "Cannot fetch attest emails (requested: {}), stopping watch",
                requested.len()
            );
            inner.log.append(
                account,
                "",
                false,
                &format!("cannot fetch attest emails for {}", account),
            )?;
            report.cannot_fetch = true;
            report.stopped_watching = self.end_watch(account, watch_id);
            return Ok(report);
        }

        let query = MailboxQuery::new(inner.attesters.sender_addresses(), account);
        let bodies = match inner.fetcher.search(account, &query).await {
            Ok(bodies) => bodies,
            Err(e) if e.is_transient() => {
                warn!("Fetching attest emails failed, will retry: {}", e);
                report.aborted = Some(CycleAbort::Remote(e));
                return Ok(report);
            }
            Err(e) => {
                warn!("Fetching attest emails failed: {}", e);
                inner.log.append(
                    account,
                    "",
                    false,
                    &format!("Error fetching attest emails: {}", e.detail()),
                )?;
                return Ok(report);
            }
        };
        debug!("Found {} candidate messages", bodies.len());

        let mut ended = false;
        for body in &bodies {
            let outcome = self.process_message(account, &key, &passphrase, body).await?;

            if outcome.stops_watch() && !ended {
                ended = true;
                report.stopped_watching = self.end_watch(account, watch_id);
            }
            let transient = match &outcome {
                PacketOutcome::Submitted(SubmitOutcome::Transient(e)) => Some(e.clone()),
                _ => None,
            };
            report.outcomes.push(outcome);

            if let Some(e) = transient {
                report.aborted = Some(CycleAbort::Remote(e));
                break;
            }
        }

        Ok(report)
    }

    async fn process_message(
        &self,
        account: &str,
        key: &PrimaryKey,
        passphrase: &SecretString,
        body: &str,
    ) -> Result<PacketOutcome> {
        let inner = &self.inner;

        let packet = match AttestPacket::parse(body) {
            Ok(packet) => packet,
            Err(e) => {
                info!("Ignoring unparseable attest message: {}", e);
                inner.log.append(
                    account,
                    body,
                    false,
                    &format!("Could not parse attest message ({}): {}", account, e),
                )?;
                return Ok(PacketOutcome::ParseFailed(e));
            }
        };

        // Re-read per message: an earlier message may have completed.
        let state = inner.state.state(account)?;
        let ctx = ValidationContext {
            account,
            primary_fingerprint: key.fingerprint(),
            attesters: &inner.attesters,
            state: &state,
        };

        match validate(&packet, &ctx) {
            Validation::Rejected(rejection) => {
                info!("Rejected packet from {}: {}", packet.attester(), rejection);
                inner.log.append(
                    account,
                    packet.raw_text(),
                    false,
                    &format!(
                        "This attest message is ignored as it does not match your settings ({}).",
                        rejection
                    ),
                )?;
                Ok(PacketOutcome::Rejected(rejection))
            }
            Validation::AlreadyAttested => {
                info!("{} already attested", packet.attester());
                inner
                    .log
                    .append(account, packet.raw_text(), true, MSG_ALREADY_ATTESTED)?;
                Ok(PacketOutcome::AlreadyAttested)
            }
            Validation::Ok => {
                let outcome = inner
                    .submitter
                    .submit(account, key, passphrase, &packet)
                    .await?;
                Ok(PacketOutcome::Submitted(outcome))
            }
        }
    }
}
