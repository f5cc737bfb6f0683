//! Mailbox access over IMAP.
//!
//! Provides the IMAP-backed packet fetcher. Mailboxes are opened read-only
//! and messages are fetched without being marked as read.

pub mod client;
pub mod error;
pub mod fetcher;

pub use client::ImapClient;
pub use error::EmailError;
pub use fetcher::ImapPacketFetcher;
