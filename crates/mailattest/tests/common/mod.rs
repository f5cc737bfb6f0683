//! Shared test utilities for mailattest integration tests.
//!
//! This module provides:
//! - In-memory fakes of every collaborator the engine drives
//! - `TestHarness` wiring the fakes to an engine over an in-memory database
//! - Builders for attest packet emails

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::TestHarness;
