//! Shared test utilities for evlo integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated ingestion runs against a temp database
//! - Builders for synthetic event XML and parser-service payloads

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{FailingSource, SyntheticLogSource, TestHarness};
