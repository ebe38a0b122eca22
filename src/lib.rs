//! Mujtamauna Match - compatibility scoring and recommendations
//!
//! This library scores candidate members against a requesting member and
//! ranks them for discovery. Scores come from a cache, an external
//! text-generation service, or a deterministic fallback scorer, so every
//! candidate always receives a value.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{exclusion_set, CompatibilityScorer, FallbackStrategy, RankError, Ranker};
pub use models::{CompatibilityScore, MatchRequest, Profile, RankedCandidate, ScoreSource, ScoringWeights};
pub use services::{OpinionSource, ScoreCache};
