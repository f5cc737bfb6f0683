//! Test harness wiring collaborator fakes to an engine.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mailattest::attest::{
    AttestEngine, Collaborators, EngineOptions, LogEntry, WatchSchedule,
};
use mailattest::Database;

use super::builders::{ACCOUNT, FINGERPRINT};
use super::fakes::{FakeApi, FakeCrypto, FakeFetcher, FakeKeyStore};

pub const PASSPHRASE: &str = "correct horse battery staple";

/// An engine over an in-memory database with every collaborator faked.
pub struct TestHarness {
    pub engine: AttestEngine,
    pub db: Database,
    pub key_store: Arc<FakeKeyStore>,
    pub crypto: Arc<FakeCrypto>,
    pub fetcher: Arc<FakeFetcher>,
    pub api: Arc<FakeApi>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_options(EngineOptions {
            schedule: Self::schedule(),
            ..EngineOptions::default()
        })
    }

    pub fn with_options(options: EngineOptions) -> Self {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let key_store = Arc::new(FakeKeyStore::new(FINGERPRINT, PASSPHRASE));
        let crypto = Arc::new(FakeCrypto::new(PASSPHRASE));
        let fetcher = Arc::new(FakeFetcher::new());
        let api = Arc::new(FakeApi::new());

        let engine = AttestEngine::new(
            db.clone(),
            Collaborators {
                key_store: key_store.clone(),
                crypto: crypto.clone(),
                fetcher: fetcher.clone(),
                api: api.clone(),
            },
            options,
        );

        Self {
            engine,
            db,
            key_store,
            crypto,
            fetcher,
            api,
        }
    }

    /// Short timings for watch tests: first check after 5s, then every 60s.
    pub fn schedule() -> WatchSchedule {
        WatchSchedule {
            initial_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(60),
        }
    }

    /// Requests a CRYPTUP attestation for [`ACCOUNT`].
    pub fn request(&self) {
        self.engine
            .request_attestation(ACCOUNT, "CRYPTUP")
            .expect("Failed to request attestation");
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.engine
            .log_entries(ACCOUNT)
            .expect("Failed to read processing log")
    }

    pub fn requested(&self) -> Vec<String> {
        self.engine
            .state(ACCOUNT)
            .expect("Failed to read state")
            .requested
            .into_iter()
            .collect()
    }

    pub fn processed(&self) -> Vec<String> {
        self.engine
            .state(ACCOUNT)
            .expect("Failed to read state")
            .processed
            .into_iter()
            .collect()
    }
}
