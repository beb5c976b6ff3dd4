//! Shared test utilities for imagerie integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a temp media directory, a database and a bulk ingestor
//! - Builders for folder/zip fixtures and pre-populated collections

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{RecordingPublisher, TestHarness};
