//! Signs validated packets with the account's private key and confirms them
//! with the attester.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::db::DatabaseError;

use super::collaborators::{AttestationApi, Crypto, PrimaryKey};
use super::error::{CryptoError, RemoteError};
use super::log::ProcessingLog;
use super::packet::{AttestAction, AttestPacket};
use super::state::{Completion, StateTracker};

pub const MSG_MISSING_PASSPHRASE: &str =
    "Missing pass phrase to process this attest message. It will be processed automatically later.";

/// What happened to a packet handed to the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The attester confirmed; state and log were updated.
    Attested(Completion),
    /// The private key could not be unlocked with the stored passphrase.
    KeyLocked(CryptoError),
    SignFailed(CryptoError),
    /// The attester answered `attested: false`.
    Refused,
    /// The attester returned a non-transient error.
    RemoteFailed(RemoteError),
    /// Network-class failure; nothing was logged and the cycle should stop.
    Transient(RemoteError),
}

impl SubmitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmitOutcome::Attested(_))
    }
}

/// Decrypt → sign → submit pipeline.
#[derive(Clone)]
pub struct Submitter {
    crypto: Arc<dyn Crypto>,
    api: Arc<dyn AttestationApi>,
    state: StateTracker,
    log: ProcessingLog,
}

impl Submitter {
    pub fn new(
        crypto: Arc<dyn Crypto>,
        api: Arc<dyn AttestationApi>,
        state: StateTracker,
        log: ProcessingLog,
    ) -> Self {
        Self {
            crypto,
            api,
            state,
            log,
        }
    }

    /// Signs `packet` and submits it. Expects the packet to have passed
    /// validation. Every outcome except `Attested` and `Transient` leaves one
    /// failure entry in the log.
    pub async fn submit(
        &self,
        account: &str,
        key: &PrimaryKey,
        passphrase: &SecretString,
        packet: &AttestPacket,
    ) -> Result<SubmitOutcome, DatabaseError> {
        let unlocked = match self.crypto.decrypt_key(key, passphrase).await {
            Ok(unlocked) => unlocked,
            Err(e) => {
                warn!("Could not unlock key {} for {}: {}", key.fingerprint(), account, e);
                self.log
                    .append(account, packet.raw_text(), false, MSG_MISSING_PASSPHRASE)?;
                return Ok(SubmitOutcome::KeyLocked(e));
            }
        };

        let signed = match self.crypto.sign(&unlocked, packet.raw_text()).await {
            Ok(signed) => signed,
            Err(e) => {
                warn!("Signing attest packet for {} failed: {}", account, e);
                self.log.append(
                    account,
                    packet.raw_text(),
                    false,
                    &format!("Error signing the attest message: {}", e),
                )?;
                return Ok(SubmitOutcome::SignFailed(e));
            }
        };

        debug!(
            "Submitting {} confirmation for {} to {}",
            packet.action(),
            account,
            packet.attester()
        );
        let response = match packet.action() {
            AttestAction::Initial => self.api.initial_confirm(&signed).await,
            AttestAction::ConfirmReplacement => self.api.replace_confirm(&signed).await,
        };

        match response {
            Ok(resp) if resp.attested => {
                let message = format!("Successfully attested {}", account);
                let completion = self.state.complete(
                    &self.log,
                    account,
                    packet.attester(),
                    packet.raw_text(),
                    &message,
                )?;
                info!("{} ({})", message, packet.attester());
                Ok(SubmitOutcome::Attested(completion))
            }
            Ok(_) => {
                warn!("Attester {} refused attestation for {}", packet.attester(), account);
                self.log.append(
                    account,
                    packet.raw_text(),
                    false,
                    &format!(
                        "Refused by attester {}: the attestation was not confirmed.",
                        packet.attester()
                    ),
                )?;
                Ok(SubmitOutcome::Refused)
            }
            Err(e) if e.is_transient() => {
                warn!("Transient attester error for {}: {}", account, e);
                Ok(SubmitOutcome::Transient(e))
            }
            Err(e) => {
                warn!("Attester request for {} failed: {}", account, e);
                self.log.append(
                    account,
                    packet.raw_text(),
                    false,
                    &format!("Attester request failed: {}", e.detail()),
                )?;
                Ok(SubmitOutcome::RemoteFailed(e))
            }
        }
    }
}
