use chrono::{NaiveDate, Utc};
use crate::models::{CompatibilityScore, MatchBreakdown, Profile, ScoreSource, ScoringWeights};

/// Deterministic compatibility scorer
///
/// Scoring formula (default budgets):
/// score = round(
///     age_points          # (5 - |age gap|) * 10 when the gap is at most 5 years
///   + city_points         # 20 when both live in the same city
///   + interest_points     # 20 * shared / max(|a|, |b|)
///   + education_points    # 10 when education levels match
/// ) clamped to 0..=100
///
/// Missing data zeroes the affected factor; scoring never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompatibilityScorer {
    weights: ScoringWeights,
}

impl CompatibilityScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score `candidate` against `subject` as of today.
    pub fn score(&self, subject: &Profile, candidate: &Profile) -> CompatibilityScore {
        self.score_on(subject, candidate, Utc::now().date_naive())
    }

    /// Score `candidate` against `subject`, deriving ages as of `today`.
    pub fn score_on(
        &self,
        subject: &Profile,
        candidate: &Profile,
        today: NaiveDate,
    ) -> CompatibilityScore {
        let breakdown = score_breakdown(subject, candidate, &self.weights, today);
        CompatibilityScore::new(
            subject.id.clone(),
            candidate.id.clone(),
            breakdown.total().round() as i64,
            ScoreSource::Deterministic,
        )
    }

    pub fn breakdown(&self, subject: &Profile, candidate: &Profile) -> MatchBreakdown {
        score_breakdown(subject, candidate, &self.weights, Utc::now().date_naive())
    }
}

/// Compute the per-factor points for a pair of profiles
pub fn score_breakdown(
    subject: &Profile,
    candidate: &Profile,
    weights: &ScoringWeights,
    today: NaiveDate,
) -> MatchBreakdown {
    let age_difference = match (subject.age_on(today), candidate.age_on(today)) {
        (Some(a), Some(b)) => Some(a.abs_diff(b)),
        _ => None,
    };
    let age_points = age_difference
        .map(|diff| calculate_age_points(diff, weights.age, weights.age_window_years))
        .unwrap_or(0.0);

    let same_city = same_category(&subject.city, &candidate.city);
    let city_points = if same_city { weights.city } else { 0.0 };

    let (interest_points, shared_interests) =
        calculate_interest_points(&subject.interests, &candidate.interests, weights.interests);

    let education_points = if same_category(&subject.education_level, &candidate.education_level) {
        weights.education
    } else {
        0.0
    };

    MatchBreakdown {
        age_points,
        city_points,
        interest_points,
        education_points,
        age_difference,
        same_city,
        shared_interests,
    }
}

/// Age points: full budget at a zero gap, falling linearly to zero at the window edge
#[inline]
fn calculate_age_points(age_difference: u8, budget: f64, window_years: u8) -> f64 {
    if age_difference > window_years {
        return 0.0;
    }
    if window_years == 0 {
        return budget;
    }
    budget * f64::from(window_years - age_difference) / f64::from(window_years)
}

/// Interest points and the shared tags, in the subject's order
fn calculate_interest_points(
    subject_interests: &[String],
    candidate_interests: &[String],
    budget: f64,
) -> (f64, Vec<String>) {
    let subject_tags = distinct_tags(subject_interests);
    let candidate_tags = distinct_tags(candidate_interests);

    if subject_tags.is_empty() || candidate_tags.is_empty() {
        return (0.0, Vec::new());
    }

    let shared: Vec<String> = subject_tags
        .iter()
        .filter(|tag| candidate_tags.contains(tag))
        .map(|tag| tag.to_string())
        .collect();

    let denominator = subject_tags.len().max(candidate_tags.len()) as f64;
    (budget * shared.len() as f64 / denominator, shared)
}

fn distinct_tags(interests: &[String]) -> Vec<&str> {
    let mut tags: Vec<&str> = Vec::with_capacity(interests.len());
    for tag in interests.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Exact, case-sensitive match; empty values never match
#[inline]
fn same_category(a: &str, b: &str) -> bool {
    !a.is_empty() && a == b
}
