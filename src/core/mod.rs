// Core algorithm exports
pub mod explain;
pub mod filters;
pub mod ranker;
pub mod scoring;

pub use explain::reasons;
pub use filters::{
    apply_filters, apply_filters_on, dedupe_by_id, exclusion_set, is_eligible, opposite_gender,
    DiscoveryFilters,
};
pub use ranker::{FallbackStrategy, RankError, Ranker};
pub use scoring::{score_breakdown, CompatibilityScorer};
