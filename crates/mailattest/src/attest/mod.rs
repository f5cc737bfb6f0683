//! Attestation synchronization: discovers attest packets in a mailbox,
//! validates and signs them, confirms them with the attester and records
//! the outcome.

pub mod collaborators;
pub mod engine;
pub mod error;
pub mod identity;
pub mod log;
pub mod packet;
pub mod scheduler;
pub mod state;
pub mod submitter;
pub mod validator;

pub use collaborators::{
    AttestResponse, AttestationApi, Crypto, KeyStore, MailboxQuery, PacketFetcher, PrimaryKey,
    UnlockedKey,
};
pub use engine::{
    AttestEngine, Collaborators, CycleAbort, CycleReport, CycleSkip, EngineOptions, PacketOutcome,
};
pub use error::{CryptoError, PacketError, RemoteError, StoreError};
pub use identity::{email_hash, normalize_email, Attester, AttesterRegistry};
pub use log::{Appended, LogEntry, ProcessingLog};
pub use packet::{AttestAction, AttestPacket, PacketFields};
pub use scheduler::{WatchRegistry, WatchSchedule};
pub use state::{AttestationState, Completion, StateTracker};
pub use submitter::{SubmitOutcome, Submitter};
pub use validator::{validate, Rejection, Validation, ValidationContext};
