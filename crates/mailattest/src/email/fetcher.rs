//! [`PacketFetcher`] over IMAP.

use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, warn};
use mail_parser::MessageParser;

use crate::attest::identity::normalize_email;
use crate::attest::{MailboxQuery, PacketFetcher, RemoteError};
use crate::config::ImapAccountConfig;

use super::client::ImapClient;
use super::error::Result;

/// Searches the configured IMAP mailboxes for attest packets. An account
/// can read its inbox when an IMAP mailbox is configured for it.
pub struct ImapPacketFetcher {
    accounts: HashMap<String, ImapAccountConfig>,
}

impl ImapPacketFetcher {
    pub fn new(accounts: Vec<ImapAccountConfig>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|a| (normalize_email(&a.account), a))
                .collect(),
        }
    }

    fn account(&self, account: &str) -> Option<&ImapAccountConfig> {
        self.accounts.get(&normalize_email(account))
    }

    async fn fetch(client: &mut ImapClient, folder: &str, query: &MailboxQuery) -> Result<Vec<String>> {
        client.connect().await?;
        client.examine_folder(folder).await?;

        let uids = client.uid_search(&query.to_imap_search()).await?;
        let messages = client.fetch_emails_peek(&uids).await?;

        Ok(messages
            .into_iter()
            .map(|(uid, raw)| {
                debug!("Decoding message UID {} ({} bytes)", uid, raw.len());
                message_text(&raw)
            })
            .collect())
    }
}

#[async_trait]
impl PacketFetcher for ImapPacketFetcher {
    async fn can_read_inbox(&self, account: &str) -> bool {
        self.account(account).is_some()
    }

    async fn search(
        &self,
        account: &str,
        query: &MailboxQuery,
    ) -> std::result::Result<Vec<String>, RemoteError> {
        let config = self.account(account).ok_or_else(|| {
            RemoteError::Protocol(format!("no IMAP mailbox configured for {}", account))
        })?;

        let mut client = ImapClient::new(config.clone());
        let result = Self::fetch(&mut client, &config.folder, query).await;
        if let Err(e) = client.disconnect().await {
            warn!("IMAP logout for {} failed: {}", account, e);
        }

        Ok(result?)
    }
}

/// Text body of a raw RFC 822 message, falling back to the raw bytes when
/// the message has no decodable text part.
pub fn message_text(raw: &[u8]) -> String {
    MessageParser::default()
        .parse(raw)
        .and_then(|message| message.body_text(0).map(|text| text.into_owned()))
        .unwrap_or_else(|| String::from_utf8_lossy(raw).into_owned())
}
