use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Member profile as supplied by the profile store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(rename = "birthDate", default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(rename = "educationLevel", alias = "education", default)]
    pub education_level: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(rename = "religionLevel", alias = "religion", default)]
    pub religion_level: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(rename = "isVerified", default)]
    pub is_verified: bool,
}

impl Profile {
    /// Age in whole years as of `today`.
    ///
    /// An explicit `age` wins over `birth_date`.
    pub fn age_on(&self, today: NaiveDate) -> Option<u8> {
        if let Some(age) = self.age {
            return Some(age);
        }
        let birth = self.birth_date?;
        if birth > today {
            return None;
        }
        let mut years = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            years -= 1;
        }
        u8::try_from(years).ok()
    }

    /// A subject must carry an id, otherwise nothing can be ranked against it.
    pub fn validate_as_subject(&self) -> Result<(), ProfileError> {
        if self.id.trim().is_empty() {
            return Err(ProfileError::MissingId);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("profile is missing an id")]
    MissingId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn opposite(self) -> Self {
        match self {
            Gender::Male => Gender::Female,
            Gender::Female => Gender::Male,
        }
    }
}

/// Where a compatibility value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoreSource {
    Deterministic,
    External,
    FallbackRandom,
}

/// Directional compatibility between a subject and a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityScore {
    #[serde(rename = "subjectId")]
    pub subject_id: String,
    #[serde(rename = "candidateId")]
    pub candidate_id: String,
    pub value: u8,
    pub source: ScoreSource,
}

impl CompatibilityScore {
    pub const MAX: u8 = 100;

    /// Build a score, clamping `value` into 0..=100.
    pub fn new(
        subject_id: impl Into<String>,
        candidate_id: impl Into<String>,
        value: i64,
        source: ScoreSource,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            candidate_id: candidate_id.into(),
            value: value.clamp(0, Self::MAX as i64) as u8,
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Connection request between two members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRequest {
    #[serde(rename = "fromId")]
    pub from_id: String,
    #[serde(rename = "toId")]
    pub to_id: String,
    pub status: RequestStatus,
}

impl MatchRequest {
    /// The other party when `user_id` is on either end of the request.
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.from_id == user_id {
            Some(&self.to_id)
        } else if self.to_id == user_id {
            Some(&self.from_id)
        } else {
            None
        }
    }

    /// Pending and accepted requests keep both members out of each other's
    /// recommendations.
    pub fn is_open_or_accepted(&self) -> bool {
        matches!(self.status, RequestStatus::Pending | RequestStatus::Accepted)
    }
}

/// Per-factor points behind a deterministic score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchBreakdown {
    #[serde(rename = "agePoints")]
    pub age_points: f64,
    #[serde(rename = "cityPoints")]
    pub city_points: f64,
    #[serde(rename = "interestPoints")]
    pub interest_points: f64,
    #[serde(rename = "educationPoints")]
    pub education_points: f64,
    #[serde(rename = "ageDifference")]
    pub age_difference: Option<u8>,
    #[serde(rename = "sameCity")]
    pub same_city: bool,
    #[serde(rename = "sharedInterests")]
    pub shared_interests: Vec<String>,
}

impl MatchBreakdown {
    pub fn total(&self) -> f64 {
        self.age_points + self.city_points + self.interest_points + self.education_points
    }
}

/// Candidate with its final score, as returned by the ranker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub profile: Profile,
    pub score: CompatibilityScore,
    pub breakdown: MatchBreakdown,
}

/// Factor budgets, expressed in points out of 100
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub age: f64,
    pub city: f64,
    pub interests: f64,
    pub education: f64,
    /// Largest age gap, in years, that still earns age points
    pub age_window_years: u8,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            age: 50.0,
            city: 20.0,
            interests: 20.0,
            education: 10.0,
            age_window_years: 5,
        }
    }
}

/// Copy language for recommendation reasons
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ar,
    En,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_age_from_birth_date() {
        let profile = Profile {
            id: "m1".to_string(),
            birth_date: Some(date(1996, 5, 20)),
            ..Default::default()
        };

        assert_eq!(profile.age_on(date(2024, 5, 19)), Some(27));
        assert_eq!(profile.age_on(date(2024, 5, 20)), Some(28));
    }

    #[test]
    fn test_explicit_age_wins() {
        let profile = Profile {
            id: "m1".to_string(),
            age: Some(30),
            birth_date: Some(date(2000, 1, 1)),
            ..Default::default()
        };

        assert_eq!(profile.age_on(date(2024, 6, 1)), Some(30));
    }

    #[test]
    fn test_future_birth_date_has_no_age() {
        let profile = Profile {
            id: "m1".to_string(),
            birth_date: Some(date(2030, 1, 1)),
            ..Default::default()
        };

        assert_eq!(profile.age_on(date(2024, 6, 1)), None);
    }

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(CompatibilityScore::new("a", "b", 140, ScoreSource::External).value, 100);
        assert_eq!(CompatibilityScore::new("a", "b", -3, ScoreSource::External).value, 0);
    }

    #[test]
    fn test_subject_requires_id() {
        let profile = Profile { id: "  ".to_string(), ..Default::default() };
        assert_eq!(profile.validate_as_subject(), Err(ProfileError::MissingId));
    }

    #[test]
    fn test_profile_accepts_original_field_names() {
        let json = r#"{
            "id": "m7",
            "name": "Amna",
            "birthDate": "1997-03-02",
            "gender": "female",
            "city": "الخرطوم",
            "education": "بكالوريوس",
            "interests": ["سفر"]
        }"#;

        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.education_level, "بكالوريوس");
        assert_eq!(profile.gender, Some(Gender::Female));
        assert_eq!(profile.birth_date, Some(date(1997, 3, 2)));
    }

    #[test]
    fn test_request_counterpart() {
        let request = MatchRequest {
            from_id: "a".to_string(),
            to_id: "b".to_string(),
            status: RequestStatus::Pending,
        };

        assert_eq!(request.counterpart("a"), Some("b"));
        assert_eq!(request.counterpart("b"), Some("a"));
        assert_eq!(request.counterpart("c"), None);
    }
}
