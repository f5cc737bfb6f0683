//! Attester HTTP API.

pub mod client;

pub use client::HttpAttesterClient;
