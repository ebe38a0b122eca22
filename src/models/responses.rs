use serde::{Deserialize, Serialize};
use crate::models::domain::{MatchBreakdown, Profile, ScoreSource};

/// One entry of a recommendation list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationView {
    pub profile: Profile,
    pub score: u8,
    pub source: ScoreSource,
    pub breakdown: MatchBreakdown,
    pub reasons: Vec<String>,
}

/// Response for the recommendations endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<RecommendationView>,
    #[serde(rename = "totalCandidates")]
    pub total_candidates: usize,
}

/// Response for the pairwise compatibility endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityResponse {
    #[serde(rename = "subjectId")]
    pub subject_id: String,
    #[serde(rename = "candidateId")]
    pub candidate_id: String,
    pub score: u8,
    pub breakdown: MatchBreakdown,
    pub reasons: Vec<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
}
