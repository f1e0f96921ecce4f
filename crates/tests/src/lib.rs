//! Integration tests for the phyto diagnosis consensus core.
//!
//! This crate contains the following test modules:
//!
//! - `consensus_tests`: End-to-end diagnosis flows through the public
//!   engine API, including hooks, deadlines, and verdict caching
//! - `invoker_tests`: In-flight de-duplication and retry/backoff behavior
//!   of the resilient invoker
//! - `cache_tests`: TTL expiry, eviction, pattern invalidation, and
//!   snapshot persistence of the result cache
//! - `mock_infrastructure`: Reusable scripted classifiers and registries
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```
//!
//! None of these tests require network access; every collaborator is a
//! scripted in-process mock.

#[cfg(test)]
mod cache_tests;


#[cfg(test)]
mod invoker_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
