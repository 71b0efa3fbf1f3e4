//! Shared primitives, traits, and utilities for the marsi descriptor engine.
//!
//! `marsi-core` provides the foundation that `marsi-chem` builds on:
//!
//! - **Error types**: [`MarsiError`] and [`Result`] for structured error handling
//! - **Traits**: Core abstractions like [`Annotated`], [`ContentAddressable`], [`Scored`]
//! - **Hashing**: SHA-256 digests used by identifiers and fingerprints
//! - **Bit arrays**: [`BitArray`], the dense form of a sparse fingerprint
//! - **Caching**: [`MemoCache`], a thread-safe LRU memo table

pub mod bitvec;
pub mod cache;
pub mod error;
pub mod hash;
pub mod traits;

pub use bitvec::BitArray;
pub use cache::MemoCache;
pub use error::{MarsiError, Result};
pub use traits::*;
