//! # Phyto Core
//!
//! Core library for the phyto plant-disease diagnosis pipeline.
//!
//! This crate provides the foundational components for:
//!
//! - **[`consensus`]**: The diagnosis consensus engine that fans a single plant
//!   image out to several independent classifier services, normalizes their
//!   disjoint payloads into one candidate model, merges and ranks the
//!   candidates, and corroborates the top candidates against a taxonomic
//!   registry.
//!
//! - **[`upstream`]**: Classifier collaborator traits plus the resilient
//!   invoker that de-duplicates in-flight calls and retries transient
//!   failures with bounded exponential backoff.
//!
//! - **[`taxonomy`]**: Registry lookup and kingdom filtering used to validate
//!   candidate disease names against authoritative records.
//!
//! - **[`cache`]**: TTL-bounded result cache with oldest-write eviction,
//!   pattern invalidation, and best-effort disk snapshotting.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      ConsensusEngine                      │
//! │  ┌───────────────┐  ┌──────────────────┐  ┌────────────┐  │
//! │  │  ResultCache  │  │ ResilientInvoker │  │ Normalizer │  │
//! │  └───────┬───────┘  └────────┬─────────┘  └─────┬──────┘  │
//! │          │                   │                  │         │
//! │  ┌───────▼───────┐  ┌────────▼─────────┐  ┌─────▼──────┐  │
//! │  │ Disk snapshot │  │ Classifier calls │  │ Merge/Rank │  │
//! │  └───────────────┘  │ Registry lookups │  └────────────┘  │
//! │                     └──────────────────┘                  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Request Flow
//!
//! ```text
//! diagnose(image, seed, scope)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Validation │ ─── Invalid ──► DiagnosisError
//! └──────┬──────┘
//!        │ Valid
//!        ▼
//! ┌─────────────┐
//! │ Cache Check │ ─── Hit ──► Cached Verdict
//! └──────┬──────┘
//!        │ Miss
//!        ▼
//! ┌──────────────────┐
//! │  Seed Normalize  │
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐      settle-all, fail-none
//! │ Classifier Fanout│ ◄─── (a failing source just
//! └────────┬─────────┘       contributes nothing)
//!          ▼
//!   Merge ─► Rank ─► Health Decision ─► Validate Top-N ─► Finalize
//! ```
//!
//! The engine is a library, not a service: authentication, transport, image
//! storage, and UI all live in the surrounding application and reach this
//! crate through the narrow [`upstream::Classifier`] and
//! [`taxonomy::TaxonomyRegistry`] seams.

pub mod cache;
pub mod consensus;
pub mod taxonomy;
pub mod types;
pub mod upstream;
