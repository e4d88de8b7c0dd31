//! Shared test utilities for bulkconv integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs over temp directories and in-memory SQLite
//! - `StubConverter`, whose behaviour is chosen by the input filename
//! - `FaultyRepository`, which fails chosen repository calls

pub mod converter;
pub mod faulty;
pub mod harness;

pub use converter::StubConverter;
pub use faulty::{Fault, FaultyRepository, ALWAYS};
pub use harness::TestHarness;
