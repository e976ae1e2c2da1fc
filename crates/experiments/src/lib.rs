//! Client-local experimentation: deterministic visitor-to-variant
//! assignment, persisted through a pluggable key-value store, with manual
//! overrides, feature flags, and exposure/conversion tracking.
//!
//! # Modules
//!
//! - [`catalog`]: Validated experiment and flag definitions
//! - [`engine`]: The assignment engine and its admin surface
//! - [`flags`]: Feature flag evaluation and overrides
//! - [`hash`]: Stable string hash and bucket selection
//! - [`identity`]: Anonymous visitor identifiers
//! - [`keys`]: Storage key layout

#![warn(clippy::unwrap_used)]

pub mod catalog;
pub mod engine;
pub mod flags;
pub mod hash;
pub mod identity;
pub mod keys;

pub use catalog::ExperimentCatalog;
pub use engine::{
    ExperimentEngine, ExperimentOverview, ExperimentSummary, ResolutionSource, VariantResolution,
};
pub use flags::FlagStatus;
pub use hash::bucket_for;
pub use identity::{AnonymousIdGenerator, IdGenerator};
pub use keys::StorageKeys;
