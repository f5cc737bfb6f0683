//! Attest packet codec.
//!
//! A packet is a block of `KEY:value` lines between two fixed marker lines,
//! embedded anywhere in a plain-text email body:
//!
//! ```text
//! -----BEGIN ATTEST PACKET-----
//! attester:CRYPTUP
//! action:INITIAL
//! fingerprint:5FEE...
//! email_hash:1B7C...
//! -----END ATTEST PACKET-----
//! ```
//!
//! Keys are matched case-insensitively and may be given either by their
//! long name or by the three-letter code used by older attesters
//! (`ATT`, `ACT`, `PUB`, `ADD`, `OLD`, `RAN`). Unknown keys are ignored.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::PacketError;
use super::identity::normalize_fingerprint;

pub const PACKET_BEGIN: &str = "-----BEGIN ATTEST PACKET-----";
pub const PACKET_END: &str = "-----END ATTEST PACKET-----";

static RE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)-----BEGIN ATTEST PACKET-----(.*?)-----END ATTEST PACKET-----").unwrap()
});

/// What the attester asks the key owner to confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttestAction {
    /// First binding of a key to the address.
    Initial,
    /// Replacement of a previously attested key.
    ConfirmReplacement,
}

impl AttestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttestAction::Initial => "INITIAL",
            AttestAction::ConfirmReplacement => "CONFIRM_REPLACEMENT",
        }
    }

    fn parse(value: &str) -> Result<Self, PacketError> {
        match value.to_ascii_uppercase().as_str() {
            "INITIAL" => Ok(AttestAction::Initial),
            "CONFIRM_REPLACEMENT" => Ok(AttestAction::ConfirmReplacement),
            _ => Err(PacketError::UnknownAction(value.to_string())),
        }
    }
}

impl fmt::Display for AttestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded field values used to build a packet programmatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketFields {
    pub attester: String,
    pub fingerprint: String,
    pub email_hash: String,
    pub action: AttestAction,
    pub fingerprint_old: Option<String>,
    pub random: Option<String>,
}

/// A decoded attest packet. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestPacket {
    fields: PacketFields,
    raw_text: String,
}

#[derive(Clone, Copy)]
enum Field {
    Attester,
    Fingerprint,
    EmailHash,
    Action,
    FingerprintOld,
    Random,
}

impl Field {
    fn lookup(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "attester" | "att" => Some(Field::Attester),
            "fingerprint" | "pub" => Some(Field::Fingerprint),
            "email_hash" | "add" => Some(Field::EmailHash),
            "action" | "act" => Some(Field::Action),
            "fingerprint_old" | "old" => Some(Field::FingerprintOld),
            "random" | "ran" => Some(Field::Random),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Field::Attester => "attester",
            Field::Fingerprint => "fingerprint",
            Field::EmailHash => "email_hash",
            Field::Action => "action",
            Field::FingerprintOld => "fingerprint_old",
            Field::Random => "random",
        }
    }
}

fn set_once(
    slot: &mut Option<String>,
    field: Field,
    value: &str,
) -> Result<(), PacketError> {
    if slot.is_some() {
        return Err(PacketError::DuplicateField(field.name()));
    }
    *slot = Some(value.to_string());
    Ok(())
}

fn hex_field(field: Field, value: String) -> Result<String, PacketError> {
    let normalized = normalize_fingerprint(&value);
    if normalized.is_empty() || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PacketError::NotHex {
            field: field.name(),
            value,
        });
    }
    Ok(normalized)
}

impl AttestPacket {
    /// Finds and decodes the attest packet embedded in `body`.
    pub fn parse(body: &str) -> Result<Self, PacketError> {
        let captures = RE_BLOCK
            .captures(body)
            .ok_or(PacketError::MissingBlock)?;
        let raw_text = captures
            .get(0)
            .map(|m| m.as_str().to_string())
            .ok_or(PacketError::MissingBlock)?;
        let payload = captures.get(1).map(|m| m.as_str()).unwrap_or_default();

        let mut attester = None;
        let mut fingerprint = None;
        let mut email_hash = None;
        let mut action = None;
        let mut fingerprint_old = None;
        let mut random = None;

        // Line 0 is the rest of the BEGIN marker line, so `idx` already
        // numbers the lines after the marker from 1.
        for (idx, line) in payload.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or(PacketError::MalformedLine { line: idx })?;
            let Some(field) = Field::lookup(key.trim()) else {
                continue;
            };
            let value = value.trim();
            let slot = match field {
                Field::Attester => &mut attester,
                Field::Fingerprint => &mut fingerprint,
                Field::EmailHash => &mut email_hash,
                Field::Action => &mut action,
                Field::FingerprintOld => &mut fingerprint_old,
                Field::Random => &mut random,
            };
            set_once(slot, field, value)?;
        }

        let attester = attester
            .filter(|v| !v.is_empty())
            .ok_or(PacketError::MissingField(Field::Attester.name()))?;
        let fingerprint = hex_field(
            Field::Fingerprint,
            fingerprint.ok_or(PacketError::MissingField(Field::Fingerprint.name()))?,
        )?;
        let email_hash = hex_field(
            Field::EmailHash,
            email_hash.ok_or(PacketError::MissingField(Field::EmailHash.name()))?,
        )?;
        let action = AttestAction::parse(
            &action.ok_or(PacketError::MissingField(Field::Action.name()))?,
        )?;
        let fingerprint_old = fingerprint_old
            .map(|v| hex_field(Field::FingerprintOld, v))
            .transpose()?;

        Ok(Self {
            fields: PacketFields {
                attester,
                fingerprint,
                email_hash,
                action,
                fingerprint_old,
                random,
            },
            raw_text,
        })
    }

    /// Builds a packet from field values, producing its canonical wire text.
    pub fn from_fields(fields: PacketFields) -> Self {
        let raw_text = encode(&fields);
        Self { fields, raw_text }
    }

    pub fn attester(&self) -> &str {
        &self.fields.attester
    }

    /// Upper-case hex fingerprint of the key being attested.
    pub fn fingerprint(&self) -> &str {
        &self.fields.fingerprint
    }

    /// Upper-case hex hash of the attested address.
    pub fn email_hash(&self) -> &str {
        &self.fields.email_hash
    }

    pub fn action(&self) -> AttestAction {
        self.fields.action
    }

    pub fn fingerprint_old(&self) -> Option<&str> {
        self.fields.fingerprint_old.as_deref()
    }

    pub fn random(&self) -> Option<&str> {
        self.fields.random.as_deref()
    }

    /// The exact packet block as received, markers included. This is the text
    /// that gets signed.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn fields(&self) -> &PacketFields {
        &self.fields
    }

    /// Wire text with long key names.
    pub fn to_text(&self) -> String {
        encode(&self.fields)
    }
}

fn encode(fields: &PacketFields) -> String {
    let mut lines = vec![
        PACKET_BEGIN.to_string(),
        format!("attester:{}", fields.attester),
        format!("action:{}", fields.action),
        format!("fingerprint:{}", fields.fingerprint),
        format!("email_hash:{}", fields.email_hash),
    ];
    if let Some(old) = &fields.fingerprint_old {
        lines.push(format!("fingerprint_old:{}", old));
    }
    if let Some(random) = &fields.random {
        lines.push(format!("random:{}", random));
    }
    lines.push(PACKET_END.to_string());
    lines.join("\n")
}
