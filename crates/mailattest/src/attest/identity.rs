//! Account identity helpers: address normalization, the email hash carried in
//! attest packets, fingerprint normalization and the known attester registry.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Attester id used when no registry is configured.
pub const DEFAULT_ATTESTER: &str = "CRYPTUP";

/// Sender address of the default attester.
pub const DEFAULT_ATTESTER_SENDER: &str = "attest@cryptup.org";

/// Extracts the bare address from `Name <addr>` forms, trims it and
/// lower-cases it.
pub fn normalize_email(raw: &str) -> String {
    let raw = raw.trim();
    let addr = match (raw.rfind('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if start < end => &raw[start + 1..end],
        _ => raw,
    };
    addr.trim().to_lowercase()
}

/// Hash of the normalized account address as carried in `email_hash`.
///
/// SHA-1 over the lowercase hex of SHA-1 over the address, rendered as
/// upper-case hex.
pub fn email_hash(account: &str) -> String {
    let inner = hex::encode(Sha1::digest(normalize_email(account).as_bytes()));
    hex::encode_upper(Sha1::digest(inner.as_bytes()))
}

/// Upper-cases a hex fingerprint and strips any grouping whitespace.
pub fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// A trusted service allowed to confirm key/address bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attester {
    /// Identifier carried in the packet's `attester` field.
    pub id: String,

    /// Addresses the attester sends its packets from.
    pub senders: Vec<String>,
}

/// The statically known attesters.
#[derive(Debug, Clone)]
pub struct AttesterRegistry {
    attesters: Vec<Attester>,
}

impl AttesterRegistry {
    pub fn new(attesters: Vec<Attester>) -> Self {
        Self { attesters }
    }

    /// Returns true if `id` names a known attester.
    pub fn contains(&self, id: &str) -> bool {
        self.attesters.iter().any(|a| a.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Attester> {
        self.attesters.iter().find(|a| a.id == id)
    }

    /// All sender addresses across attesters, normalized and de-duplicated
    /// in registry order.
    pub fn sender_addresses(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for sender in self.attesters.iter().flat_map(|a| a.senders.iter()) {
            let sender = normalize_email(sender);
            if !out.contains(&sender) {
                out.push(sender);
            }
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attester> {
        self.attesters.iter()
    }
}

impl Default for AttesterRegistry {
    fn default() -> Self {
        Self::new(vec![Attester {
            id: DEFAULT_ATTESTER.to_string(),
            senders: vec![DEFAULT_ATTESTER_SENDER.to_string()],
        }])
    }
}
