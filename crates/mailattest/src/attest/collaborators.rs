//! Interfaces of the services the engine orchestrates: the local key store,
//! the crypto library, the mailbox search service and the attester API.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::error::{CryptoError, RemoteError, StoreError};
use super::identity::{normalize_email, normalize_fingerprint};
use super::packet::{PACKET_BEGIN, PACKET_END};

/// The account's designated default key pair, still locked.
#[derive(Debug, Clone)]
pub struct PrimaryKey {
    fingerprint: String,
    armored: String,
}

impl PrimaryKey {
    pub fn new(fingerprint: impl AsRef<str>, armored: impl Into<String>) -> Self {
        Self {
            fingerprint: normalize_fingerprint(fingerprint.as_ref()),
            armored: armored.into(),
        }
    }

    /// Upper-case hex fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Armored (encrypted) private key.
    pub fn armored(&self) -> &str {
        &self.armored
    }
}

/// A private key that has been decrypted and can sign.
pub struct UnlockedKey {
    fingerprint: String,
    material: SecretString,
}

impl UnlockedKey {
    pub fn new(fingerprint: impl AsRef<str>, material: SecretString) -> Self {
        Self {
            fingerprint: normalize_fingerprint(fingerprint.as_ref()),
            material,
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn material(&self) -> &SecretString {
        &self.material
    }
}

impl std::fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Response body of both attester confirmation endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestResponse {
    pub attested: bool,
}

/// Search for attest packets addressed to one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxQuery {
    /// Attester sender addresses; any of them matches.
    pub from: Vec<String>,
    /// The account's primary address. Aliases are not searched.
    pub to: String,
    /// Begin and end markers that must both be present in the body.
    pub markers: (String, String),
}

impl MailboxQuery {
    pub fn new(from: Vec<String>, account: &str) -> Self {
        Self {
            from,
            to: normalize_email(account),
            markers: (PACKET_BEGIN.to_string(), PACKET_END.to_string()),
        }
    }

    /// Provider search syntax, e.g.
    /// `from:attest@cryptup.org to:a@x.com "-----BEGIN ..." AND "-----END ..."`.
    pub fn to_gmail_query(&self) -> String {
        let from = self
            .from
            .iter()
            .map(|f| format!("from:{}", f))
            .collect::<Vec<_>>()
            .join(" OR ");
        let from = if self.from.len() > 1 {
            format!("({})", from)
        } else {
            from
        };
        format!(
            "{} to:{} \"{}\" AND \"{}\"",
            from, self.to, self.markers.0, self.markers.1
        )
    }

    /// IMAP `SEARCH` criteria (RFC 3501) for the same query.
    pub fn to_imap_search(&self) -> String {
        let mut senders: Vec<String> = self
            .from
            .iter()
            .map(|f| format!("FROM {}", imap_quote(f)))
            .collect();
        let mut criteria = Vec::new();
        // OR takes exactly two keys, so fold the list right-to-left.
        if let Some(last) = senders.pop() {
            let folded = senders
                .into_iter()
                .rev()
                .fold(last, |acc, prev| format!("OR {} {}", prev, acc));
            criteria.push(folded);
        }
        criteria.push(format!("TO {}", imap_quote(&self.to)));
        criteria.push(format!("BODY {}", imap_quote(&self.markers.0)));
        criteria.push(format!("BODY {}", imap_quote(&self.markers.1)));
        criteria.join(" ")
    }
}

fn imap_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Local encrypted key storage and passphrase vault.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// The account's primary key, or `None` when none is provisioned yet.
    async fn primary_key(&self, account: &str) -> Result<Option<PrimaryKey>, StoreError>;

    /// The passphrase for `key`, or `None` when the user has not supplied it.
    async fn passphrase(
        &self,
        account: &str,
        key: &PrimaryKey,
    ) -> Result<Option<SecretString>, StoreError>;
}

/// Key decryption and signing.
#[async_trait]
pub trait Crypto: Send + Sync {
    async fn decrypt_key(
        &self,
        key: &PrimaryKey,
        passphrase: &SecretString,
    ) -> Result<UnlockedKey, CryptoError>;

    /// Produces a cleartext-signed blob of `text`.
    async fn sign(&self, key: &UnlockedKey, text: &str) -> Result<String, CryptoError>;
}

/// Mailbox search service.
#[async_trait]
pub trait PacketFetcher: Send + Sync {
    /// Whether the provider granted inbox read access for `account`.
    async fn can_read_inbox(&self, account: &str) -> bool;

    /// Returns the plain-text bodies of every matching message.
    async fn search(&self, account: &str, query: &MailboxQuery)
        -> Result<Vec<String>, RemoteError>;
}

/// Remote attester confirmation endpoints.
#[async_trait]
pub trait AttestationApi: Send + Sync {
    async fn initial_confirm(&self, signed: &str) -> Result<AttestResponse, RemoteError>;

    async fn replace_confirm(&self, signed: &str) -> Result<AttestResponse, RemoteError>;
}
