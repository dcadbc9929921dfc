//! Fixtures for unit tests
//!
//! Deterministic keys and accounts, header mining against an easy target,
//! transaction builders and an engine factory backed by a temporary store.

pub mod test_utils;

pub use test_utils::*;
