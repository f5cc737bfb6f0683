//! In-memory collaborator fakes that record every call.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use mailattest::attest::{
    AttestResponse, AttestationApi, Crypto, CryptoError, KeyStore, MailboxQuery, PacketFetcher,
    PrimaryKey, RemoteError, StoreError, UnlockedKey,
};

pub struct FakeKeyStore {
    pub key: Mutex<Option<PrimaryKey>>,
    pub passphrase: Mutex<Option<String>>,
    pub error: Mutex<Option<StoreError>>,
}

impl FakeKeyStore {
    pub fn new(fingerprint: &str, passphrase: &str) -> Self {
        Self {
            key: Mutex::new(Some(PrimaryKey::new(fingerprint, "ARMORED PRIVATE KEY"))),
            passphrase: Mutex::new(Some(passphrase.to_string())),
            error: Mutex::new(None),
        }
    }

    pub fn remove_key(&self) {
        *self.key.lock().unwrap() = None;
    }

    pub fn forget_passphrase(&self) {
        *self.passphrase.lock().unwrap() = None;
    }

    pub fn fail_with(&self, error: StoreError) {
        *self.error.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl KeyStore for FakeKeyStore {
    async fn primary_key(&self, _account: &str) -> Result<Option<PrimaryKey>, StoreError> {
        if let Some(e) = self.error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.key.lock().unwrap().clone())
    }

    async fn passphrase(
        &self,
        _account: &str,
        _key: &PrimaryKey,
    ) -> Result<Option<SecretString>, StoreError> {
        Ok(self
            .passphrase
            .lock()
            .unwrap()
            .clone()
            .map(SecretString::from))
    }
}

/// Accepts exactly one passphrase and signs by wrapping the text.
pub struct FakeCrypto {
    pub expected_passphrase: String,
    pub fail_sign: AtomicBool,
    pub signed: Mutex<Vec<String>>,
}

impl FakeCrypto {
    pub fn new(expected_passphrase: &str) -> Self {
        Self {
            expected_passphrase: expected_passphrase.to_string(),
            fail_sign: AtomicBool::new(false),
            signed: Mutex::new(Vec::new()),
        }
    }

    pub fn sign_count(&self) -> usize {
        self.signed.lock().unwrap().len()
    }
}

pub fn fake_signature(text: &str) -> String {
    format!("-----BEGIN SIGNED MESSAGE-----\n{}\n-----SIGNATURE-----", text)
}

#[async_trait]
impl Crypto for FakeCrypto {
    async fn decrypt_key(
        &self,
        key: &PrimaryKey,
        passphrase: &SecretString,
    ) -> Result<UnlockedKey, CryptoError> {
        if passphrase.expose_secret() != self.expected_passphrase {
            return Err(CryptoError::Decrypt("wrong passphrase".to_string()));
        }
        Ok(UnlockedKey::new(
            key.fingerprint(),
            SecretString::from("UNLOCKED".to_string()),
        ))
    }

    async fn sign(&self, _key: &UnlockedKey, text: &str) -> Result<String, CryptoError> {
        if self.fail_sign.load(Ordering::SeqCst) {
            return Err(CryptoError::Sign("key cannot sign".to_string()));
        }
        self.signed.lock().unwrap().push(text.to_string());
        Ok(fake_signature(text))
    }
}

pub struct FakeFetcher {
    pub readable: AtomicBool,
    pub messages: Mutex<Vec<String>>,
    pub error: Mutex<Option<RemoteError>>,
    pub queries: Mutex<Vec<MailboxQuery>>,
    /// When each search began, on tokio's clock.
    pub search_started: Mutex<Vec<Instant>>,
    /// Latency of the inbox capability lookup. The flag is read before waiting.
    pub inbox_delay: Mutex<Option<Duration>>,
    pub search_delay: Mutex<Option<Duration>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            readable: AtomicBool::new(true),
            messages: Mutex::new(Vec::new()),
            error: Mutex::new(None),
            queries: Mutex::new(Vec::new()),
            search_started: Mutex::new(Vec::new()),
            inbox_delay: Mutex::new(None),
            search_delay: Mutex::new(None),
        }
    }

    pub fn delay_inbox_check(&self, delay: Duration) {
        *self.inbox_delay.lock().unwrap() = Some(delay);
    }

    pub fn delay_search(&self, delay: Duration) {
        *self.search_delay.lock().unwrap() = Some(delay);
    }

    pub fn deliver(&self, body: String) {
        self.messages.lock().unwrap().push(body);
    }

    pub fn fail_with(&self, error: RemoteError) {
        *self.error.lock().unwrap() = Some(error);
    }

    pub fn search_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl PacketFetcher for FakeFetcher {
    async fn can_read_inbox(&self, _account: &str) -> bool {
        let readable = self.readable.load(Ordering::SeqCst);
        let delay = *self.inbox_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        readable
    }

    async fn search(&self, _account: &str, query: &MailboxQuery) -> Result<Vec<String>, RemoteError> {
        self.queries.lock().unwrap().push(query.clone());
        self.search_started.lock().unwrap().push(Instant::now());
        let delay = *self.search_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.messages.lock().unwrap().clone())
    }
}

/// Answers from a queue of scripted responses, then `attested: true`.
pub struct FakeApi {
    pub responses: Mutex<VecDeque<Result<AttestResponse, RemoteError>>>,
    pub initial_calls: Mutex<Vec<String>>,
    pub replace_calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            initial_calls: Mutex::new(Vec::new()),
            replace_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(&self, response: Result<AttestResponse, RemoteError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn initial_count(&self) -> usize {
        self.initial_calls.lock().unwrap().len()
    }

    pub fn replace_count(&self) -> usize {
        self.replace_calls.lock().unwrap().len()
    }

    pub fn total_calls(&self) -> usize {
        self.initial_count() + self.replace_count()
    }

    fn next(&self) -> Result<AttestResponse, RemoteError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(AttestResponse { attested: true }))
    }
}

#[async_trait]
impl AttestationApi for FakeApi {
    async fn initial_confirm(&self, signed: &str) -> Result<AttestResponse, RemoteError> {
        self.initial_calls.lock().unwrap().push(signed.to_string());
        self.next()
    }

    async fn replace_confirm(&self, signed: &str) -> Result<AttestResponse, RemoteError> {
        self.replace_calls.lock().unwrap().push(signed.to_string());
        self.next()
    }
}
