use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::core::filters::DiscoveryFilters;
use crate::models::domain::Language;

/// Request for ranked recommendations
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecommendRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    /// Falls back to the configured default when absent
    #[validate(range(min = 1, max = 100))]
    #[serde(default)]
    pub limit: Option<u16>,
    #[serde(default)]
    #[serde(alias = "exclude_user_ids", rename = "excludeUserIds")]
    pub exclude_user_ids: Vec<String>,
    #[serde(default = "default_true")]
    #[serde(alias = "opposite_gender_only", rename = "oppositeGenderOnly")]
    pub opposite_gender_only: bool,
    #[serde(default)]
    pub lang: Language,
    /// Member-chosen discovery filters; omitted means no narrowing
    #[validate(nested)]
    #[serde(default)]
    pub filters: DiscoveryFilters,
}

fn default_true() -> bool {
    true
}

/// Query for a single pair's deterministic compatibility
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompatibilityQuery {
    #[validate(length(min = 1))]
    #[serde(alias = "subject_id", rename = "subjectId")]
    pub subject_id: String,
    #[validate(length(min = 1))]
    #[serde(alias = "candidate_id", rename = "candidateId")]
    pub candidate_id: String,
    #[serde(default)]
    pub lang: Language,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommend_request_defaults() {
        let req: RecommendRequest = serde_json::from_str(r#"{"userId": "u1"}"#).unwrap();

        assert_eq!(req.limit, None);
        assert!(req.opposite_gender_only);
        assert!(req.exclude_user_ids.is_empty());
        assert_eq!(req.lang, Language::Ar);
        assert_eq!(req.filters, DiscoveryFilters::default());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_recommend_request_validates_filters() {
        let req: RecommendRequest = serde_json::from_str(
            r#"{"userId": "u1", "filters": {"minAge": 35, "maxAge": 25, "cities": ["كسلا"]}}"#,
        )
        .unwrap();

        assert_eq!(req.filters.cities, vec!["كسلا"]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_recommend_request_rejects_zero_limit() {
        let req: RecommendRequest =
            serde_json::from_str(r#"{"userId": "u1", "limit": 0, "lang": "en"}"#).unwrap();

        assert!(req.validate().is_err());
    }
}
