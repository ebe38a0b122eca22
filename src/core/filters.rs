use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::{Validate, ValidationError};

use crate::models::{MatchRequest, Profile};

/// Build the set of ids that must never be recommended to `subject_id`
///
/// Contains the subject itself and the other party of every pending or
/// accepted request, whichever direction it was sent in.
pub fn exclusion_set(subject_id: &str, requests: &[MatchRequest]) -> HashSet<String> {
    let mut excluded: HashSet<String> = requests
        .iter()
        .filter(|request| request.is_open_or_accepted())
        .filter_map(|request| request.counterpart(subject_id))
        .map(str::to_string)
        .collect();

    excluded.insert(subject_id.to_string());
    excluded
}

/// Keep candidates of the subject's opposite gender
///
/// Nothing is filtered when the subject's gender is unknown; candidates with
/// an unknown gender are dropped otherwise.
pub fn opposite_gender(subject: &Profile, candidates: Vec<Profile>) -> Vec<Profile> {
    let Some(gender) = subject.gender else {
        return candidates;
    };
    let wanted = gender.opposite();

    candidates
        .into_iter()
        .filter(|candidate| candidate.gender == Some(wanted))
        .collect()
}

/// Drop repeated ids, keeping the first occurrence and the input order
pub fn dedupe_by_id(candidates: Vec<Profile>) -> Vec<Profile> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.id.clone()))
        .collect()
}

/// Check if a candidate may appear in a subject's recommendations
#[inline]
pub fn is_eligible(candidate: &Profile, excluded: &HashSet<String>) -> bool {
    !candidate.id.trim().is_empty() && !excluded.contains(&candidate.id)
}

/// Member-chosen discovery filters
///
/// Every list is an allow-list; an empty list filters nothing. Age bounds
/// are inclusive and only apply when set, in which case candidates of
/// unknown age are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_age_range"))]
pub struct DiscoveryFilters {
    #[validate(range(min = 18, max = 120))]
    #[serde(alias = "min_age", rename = "minAge", default)]
    pub min_age: Option<u8>,
    #[validate(range(min = 18, max = 120))]
    #[serde(alias = "max_age", rename = "maxAge", default)]
    pub max_age: Option<u8>,
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default)]
    pub education: Vec<String>,
    #[serde(default)]
    pub religion: Vec<String>,
    /// Candidates must share at least one of these
    #[serde(default)]
    pub interests: Vec<String>,
}

fn validate_age_range(filters: &DiscoveryFilters) -> Result<(), ValidationError> {
    match (filters.min_age, filters.max_age) {
        (Some(min), Some(max)) if min > max => Err(ValidationError::new("age_range")),
        _ => Ok(()),
    }
}

/// Keep candidates that pass every discovery filter, as of today
pub fn apply_filters(candidates: Vec<Profile>, filters: &DiscoveryFilters) -> Vec<Profile> {
    apply_filters_on(candidates, filters, Utc::now().date_naive())
}

/// Keep candidates that pass every discovery filter, deriving ages as of `today`
pub fn apply_filters_on(
    candidates: Vec<Profile>,
    filters: &DiscoveryFilters,
    today: NaiveDate,
) -> Vec<Profile> {
    if filters == &DiscoveryFilters::default() {
        return candidates;
    }

    candidates
        .into_iter()
        .filter(|candidate| {
            within_age_range(candidate, filters.min_age, filters.max_age, today)
                && in_allow_list(&candidate.city, &filters.cities)
                && in_allow_list(&candidate.education_level, &filters.education)
                && in_allow_list(&candidate.religion_level, &filters.religion)
                && shares_any(&candidate.interests, &filters.interests)
        })
        .collect()
}

#[inline]
fn within_age_range(candidate: &Profile, min: Option<u8>, max: Option<u8>, today: NaiveDate) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(age) = candidate.age_on(today) else {
        return false;
    };
    min.map_or(true, |min| age >= min) && max.map_or(true, |max| age <= max)
}

#[inline]
fn in_allow_list(value: &str, allowed: &[String]) -> bool {
    allowed.is_empty() || allowed.iter().any(|a| a.trim() == value.trim())
}

#[inline]
fn shares_any(interests: &[String], wanted: &[String]) -> bool {
    wanted.is_empty()
        || wanted
            .iter()
            .any(|w| interests.iter().any(|i| i.trim() == w.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, RequestStatus};

    fn request(from: &str, to: &str, status: RequestStatus) -> MatchRequest {
        MatchRequest {
            from_id: from.to_string(),
            to_id: to.to_string(),
            status,
        }
    }

    fn member(id: &str, gender: Option<Gender>) -> Profile {
        Profile {
            id: id.to_string(),
            gender,
            ..Default::default()
        }
    }

    #[test]
    fn test_exclusion_set_covers_both_directions() {
        let requests = vec![
            request("me", "a", RequestStatus::Pending),
            request("b", "me", RequestStatus::Accepted),
            request("me", "c", RequestStatus::Rejected),
            request("x", "y", RequestStatus::Accepted),
        ];

        let excluded = exclusion_set("me", &requests);

        assert!(excluded.contains("me"));
        assert!(excluded.contains("a"));
        assert!(excluded.contains("b"));
        assert!(!excluded.contains("c"));
        assert!(!excluded.contains("x"));
        assert_eq!(excluded.len(), 3);
    }

    #[test]
    fn test_opposite_gender_filter() {
        let subject = member("me", Some(Gender::Male));
        let candidates = vec![
            member("1", Some(Gender::Female)),
            member("2", Some(Gender::Male)),
            member("3", None),
        ];

        let kept = opposite_gender(&subject, candidates);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "1");
    }

    #[test]
    fn test_opposite_gender_without_subject_gender() {
        let subject = member("me", None);
        let candidates = vec![member("1", Some(Gender::Female)), member("2", Some(Gender::Male))];

        assert_eq!(opposite_gender(&subject, candidates).len(), 2);
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn aged(id: &str, age: Option<u8>) -> Profile {
        Profile {
            id: id.to_string(),
            age,
            ..Default::default()
        }
    }

    fn ids(profiles: &[Profile]) -> Vec<&str> {
        profiles.iter().map(|p| p.id.as_str()).collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_default_filters_keep_everyone() {
        let candidates = vec![aged("1", None), aged("2", Some(40)), Profile::default()];

        let kept = apply_filters_on(candidates.clone(), &DiscoveryFilters::default(), today());
        assert_eq!(kept, candidates);
    }

    #[test]
    fn test_age_range_is_inclusive() {
        let filters = DiscoveryFilters {
            min_age: Some(25),
            max_age: Some(30),
            ..Default::default()
        };
        let candidates = vec![
            aged("24", Some(24)),
            aged("25", Some(25)),
            aged("30", Some(30)),
            aged("31", Some(31)),
            aged("unknown", None),
        ];

        let kept = apply_filters_on(candidates, &filters, today());
        assert_eq!(ids(&kept), vec!["25", "30"]);
    }

    #[test]
    fn test_open_ended_age_bound() {
        let filters = DiscoveryFilters {
            max_age: Some(30),
            ..Default::default()
        };
        let born = Profile {
            id: "born".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1995, 6, 2),
            ..Default::default()
        };

        // 29 until tomorrow
        let kept = apply_filters_on(vec![aged("18", Some(18)), aged("31", Some(31)), born], &filters, today());
        assert_eq!(ids(&kept), vec!["18", "born"]);
    }

    #[test]
    fn test_city_education_religion_allow_lists() {
        let member = |id: &str, city: &str, education: &str, religion: &str| Profile {
            id: id.to_string(),
            city: city.to_string(),
            education_level: education.to_string(),
            religion_level: religion.to_string(),
            ..Default::default()
        };
        let candidates = vec![
            member("1", "كسلا", "بكالوريوس", "محافظة"),
            member("2", "الخرطوم", "بكالوريوس", "محافظة"),
            member("3", "كسلا", "دبلوم", "محافظة"),
            member("4", "كسلا", "بكالوريوس", "معتدلة"),
        ];

        let by_city = DiscoveryFilters { cities: strings(&["كسلا"]), ..Default::default() };
        assert_eq!(ids(&apply_filters_on(candidates.clone(), &by_city, today())), vec!["1", "3", "4"]);

        let by_education = DiscoveryFilters { education: strings(&["بكالوريوس"]), ..Default::default() };
        assert_eq!(ids(&apply_filters_on(candidates.clone(), &by_education, today())), vec!["1", "2", "4"]);

        let by_religion = DiscoveryFilters { religion: strings(&["محافظة"]), ..Default::default() };
        assert_eq!(ids(&apply_filters_on(candidates.clone(), &by_religion, today())), vec!["1", "2", "3"]);

        let combined = DiscoveryFilters {
            cities: strings(&["كسلا"]),
            education: strings(&["بكالوريوس"]),
            religion: strings(&["محافظة"]),
            ..Default::default()
        };
        assert_eq!(ids(&apply_filters_on(candidates, &combined, today())), vec!["1"]);
    }

    #[test]
    fn test_interest_filter_needs_any_overlap() {
        let with_interests = |id: &str, interests: &[&str]| Profile {
            id: id.to_string(),
            interests: strings(interests),
            ..Default::default()
        };
        let filters = DiscoveryFilters {
            interests: strings(&["سفر", "طبخ"]),
            ..Default::default()
        };
        let candidates = vec![
            with_interests("1", &["طبخ", "فن"]),
            with_interests("2", &["رياضة"]),
            with_interests("3", &[]),
        ];

        assert_eq!(ids(&apply_filters_on(candidates, &filters, today())), vec!["1"]);
    }

    #[test]
    fn test_age_range_validation() {
        let inverted = DiscoveryFilters {
            min_age: Some(40),
            max_age: Some(30),
            ..Default::default()
        };
        let too_young = DiscoveryFilters {
            min_age: Some(16),
            ..Default::default()
        };
        let fine = DiscoveryFilters {
            min_age: Some(18),
            max_age: Some(80),
            ..Default::default()
        };

        assert!(inverted.validate().is_err());
        assert!(too_young.validate().is_err());
        assert!(fine.validate().is_ok());
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let mut first = member("1", None);
        first.name = "first".to_string();
        let mut second = member("1", None);
        second.name = "second".to_string();

        let kept = dedupe_by_id(vec![first, member("2", None), second]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].name, "first");
        assert_eq!(kept[1].id, "2");
    }
}
