// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    CompatibilityScore, Gender, Language, MatchBreakdown, MatchRequest, Profile, ProfileError,
    RankedCandidate, RequestStatus, ScoreSource, ScoringWeights,
};
pub use requests::{CompatibilityQuery, RecommendRequest};
pub use responses::{
    CompatibilityResponse, ErrorResponse, HealthResponse, RecommendResponse, RecommendationView,
};
