//! Builders for attest packet emails.

#![allow(dead_code)]

use mailattest::attest::{email_hash, AttestAction, AttestPacket, PacketFields};

pub const ACCOUNT: &str = "alice@example.com";
pub const FINGERPRINT: &str = "5FEE9B0C6F1A3D2E4B5A69788796A5B4C3D2E1F0";
pub const OTHER_FINGERPRINT: &str = "0123456789ABCDEF0123456789ABCDEF01234567";

/// Builder for the packet an attester would mail to an account.
pub struct PacketBuilder {
    fields: PacketFields,
}

impl PacketBuilder {
    /// A valid INITIAL packet from CRYPTUP for [`ACCOUNT`] and [`FINGERPRINT`].
    pub fn new() -> Self {
        Self {
            fields: PacketFields {
                attester: "CRYPTUP".to_string(),
                fingerprint: FINGERPRINT.to_string(),
                email_hash: email_hash(ACCOUNT),
                action: AttestAction::Initial,
                fingerprint_old: None,
                random: Some("8C4D2E1A".to_string()),
            },
        }
    }

    pub fn attester(mut self, attester: &str) -> Self {
        self.fields.attester = attester.to_string();
        self
    }

    pub fn fingerprint(mut self, fingerprint: &str) -> Self {
        self.fields.fingerprint = fingerprint.to_string();
        self
    }

    pub fn for_account(mut self, account: &str) -> Self {
        self.fields.email_hash = email_hash(account);
        self
    }

    pub fn replacement(mut self, old_fingerprint: &str) -> Self {
        self.fields.action = AttestAction::ConfirmReplacement;
        self.fields.fingerprint_old = Some(old_fingerprint.to_string());
        self
    }

    pub fn packet(self) -> AttestPacket {
        AttestPacket::from_fields(self.fields)
    }

    /// The packet as it appears in an email body, with surrounding prose.
    pub fn email_body(self) -> String {
        format!(
            "Hello,\r\n\r\nplease confirm your key by leaving this message in your inbox.\r\n\r\n{}\r\n\r\n-- \r\nThe attester\r\n",
            self.packet().to_text().replace('\n', "\r\n")
        )
    }
}

/// An email that looks like an attest message but carries no packet.
pub fn broken_email_body() -> String {
    "-----BEGIN ATTEST PACKET-----\r\nthis line has no separator\r\n-----END ATTEST PACKET-----\r\n"
        .to_string()
}
