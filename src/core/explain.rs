use crate::models::{Language, MatchBreakdown};

/// Human-readable reasons behind a recommendation
///
/// Covers the age gap, the city and the number of shared interests.
pub fn reasons(breakdown: &MatchBreakdown, lang: Language) -> Vec<String> {
    let mut lines = Vec::with_capacity(3);

    if let Some(gap) = breakdown.age_difference {
        lines.push(match lang {
            Language::Ar => format!("عمر متقارب ({} سنة فرق)", gap),
            Language::En => format!("Close in age ({} year gap)", gap),
        });
    }

    lines.push(match (lang, breakdown.same_city) {
        (Language::Ar, true) => "من نفس المدينة".to_string(),
        (Language::Ar, false) => "مدن مختلفة".to_string(),
        (Language::En, true) => "Lives in the same city".to_string(),
        (Language::En, false) => "Lives in a different city".to_string(),
    });

    let shared = breakdown.shared_interests.len();
    lines.push(match lang {
        Language::Ar => format!("{} اهتمامات مشتركة", shared),
        Language::En => format!("{} shared interests", shared),
    });

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arabic_reasons() {
        let breakdown = MatchBreakdown {
            age_difference: Some(2),
            same_city: true,
            shared_interests: vec!["سفر".to_string()],
            ..Default::default()
        };

        let lines = reasons(&breakdown, Language::Ar);
        assert_eq!(
            lines,
            vec!["عمر متقارب (2 سنة فرق)", "من نفس المدينة", "1 اهتمامات مشتركة"]
        );
    }

    #[test]
    fn test_unknown_age_skips_age_line() {
        let lines = reasons(&MatchBreakdown::default(), Language::En);
        assert_eq!(lines, vec!["Lives in a different city", "0 shared interests"]);
    }
}
