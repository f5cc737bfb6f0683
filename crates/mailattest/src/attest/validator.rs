//! Packet validation against the account's key and identity.
//!
//! Validation is an ordered list of named checks. The first check that does
//! not pass decides the outcome; a packet passing all of them is `Ok`.

use std::fmt;

use super::identity::{email_hash, AttesterRegistry};
use super::packet::AttestPacket;
use super::state::AttestationState;

/// Why a packet was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnrecognizedAttester,
    KeyMismatch,
    EmailMismatch,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::UnrecognizedAttester => "unrecognized attester",
            Rejection::KeyMismatch => "key mismatch",
            Rejection::EmailMismatch => "email mismatch",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Outcome of validating one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Sign and submit.
    Ok,
    /// The attester is already processed for this account; nothing to do.
    AlreadyAttested,
    Rejected(Rejection),
}

/// Everything the checks compare a packet against.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub account: &'a str,
    /// Upper-case hex fingerprint of the account's primary key.
    pub primary_fingerprint: &'a str,
    pub attesters: &'a AttesterRegistry,
    pub state: &'a AttestationState,
}

/// A named validation step. `None` means the packet passes this step.
pub struct Check {
    pub name: &'static str,
    pub run: fn(&AttestPacket, &ValidationContext<'_>) -> Option<Validation>,
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

/// Checks in evaluation order.
pub const CHECKS: &[Check] = &[
    Check {
        name: "attester_known",
        run: attester_known,
    },
    Check {
        name: "fingerprint_matches",
        run: fingerprint_matches,
    },
    Check {
        name: "email_hash_matches",
        run: email_hash_matches,
    },
    Check {
        name: "not_already_processed",
        run: not_already_processed,
    },
];

pub fn attester_known(packet: &AttestPacket, ctx: &ValidationContext<'_>) -> Option<Validation> {
    (!ctx.attesters.contains(packet.attester()))
        .then_some(Validation::Rejected(Rejection::UnrecognizedAttester))
}

pub fn fingerprint_matches(
    packet: &AttestPacket,
    ctx: &ValidationContext<'_>,
) -> Option<Validation> {
    (packet.fingerprint() != ctx.primary_fingerprint.to_uppercase())
        .then_some(Validation::Rejected(Rejection::KeyMismatch))
}

pub fn email_hash_matches(
    packet: &AttestPacket,
    ctx: &ValidationContext<'_>,
) -> Option<Validation> {
    (packet.email_hash() != email_hash(ctx.account))
        .then_some(Validation::Rejected(Rejection::EmailMismatch))
}

pub fn not_already_processed(
    packet: &AttestPacket,
    ctx: &ValidationContext<'_>,
) -> Option<Validation> {
    ctx.state
        .is_processed(packet.attester())
        .then_some(Validation::AlreadyAttested)
}

/// Runs every check in order and returns the first non-passing outcome.
pub fn validate(packet: &AttestPacket, ctx: &ValidationContext<'_>) -> Validation {
    for check in CHECKS {
        if let Some(outcome) = (check.run)(packet, ctx) {
            log::debug!(
                "Packet from {} stopped at check '{}': {:?}",
                packet.attester(),
                check.name,
                outcome
            );
            return outcome;
        }
    }
    Validation::Ok
}
