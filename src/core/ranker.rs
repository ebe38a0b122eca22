use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use thiserror::Error;

use crate::core::filters::{dedupe_by_id, is_eligible};
use crate::core::scoring::{score_breakdown, CompatibilityScorer};
use crate::models::{CompatibilityScore, Profile, ProfileError, RankedCandidate, ScoreSource};
use crate::services::{OpinionSource, ScoreCache};

/// Errors that abort a ranking request
///
/// Only the subject can make a request fail; candidate-level problems are
/// normalized away.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("Invalid subject: {0}")]
    InvalidSubject(#[from] ProfileError),
}

/// How candidates left unscored by the opinion source are filled in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Use the deterministic scorer
    #[default]
    Deterministic,
    /// Use a placeholder value in 88..=92
    Random,
}

impl FallbackStrategy {
    pub const RANDOM_RANGE: std::ops::RangeInclusive<i64> = 88..=92;
}

/// Recommendation pipeline
///
/// # Pipeline Stages
/// 1. Exclusions: self, excluded ids, duplicates
/// 2. Cache lookup
/// 3. One batched opinion request for cache misses
/// 4. Fallback scoring for anything still unscored
/// 5. Cache write-back of new scores
/// 6. Stable sort by score, descending
#[derive(Clone)]
pub struct Ranker {
    scorer: CompatibilityScorer,
    opinion: Arc<dyn OpinionSource>,
    cache: ScoreCache,
    opinion_timeout: Duration,
    fallback: FallbackStrategy,
}

impl Ranker {
    pub const DEFAULT_OPINION_TIMEOUT: Duration = Duration::from_secs(8);

    pub fn new(scorer: CompatibilityScorer, opinion: Arc<dyn OpinionSource>, cache: ScoreCache) -> Self {
        Self {
            scorer,
            opinion,
            cache,
            opinion_timeout: Self::DEFAULT_OPINION_TIMEOUT,
            fallback: FallbackStrategy::default(),
        }
    }

    pub fn with_opinion_timeout(mut self, timeout: Duration) -> Self {
        self.opinion_timeout = timeout;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn scorer(&self) -> &CompatibilityScorer {
        &self.scorer
    }

    /// Rank `candidates` for `subject`
    ///
    /// Every returned candidate carries a score in 0..=100. Ties keep the
    /// order in which candidates were supplied.
    pub async fn rank(
        &self,
        subject: &Profile,
        candidates: Vec<Profile>,
        exclusions: &HashSet<String>,
    ) -> Result<Vec<RankedCandidate>, RankError> {
        self.rank_until(subject, candidates, exclusions, std::future::pending())
            .await
    }

    /// Rank like [`Ranker::rank`], abandoning the opinion request once `cancel` resolves
    ///
    /// Candidates still waiting on the opinion source at that point are
    /// scored by the fallback instead.
    pub async fn rank_until<F>(
        &self,
        subject: &Profile,
        candidates: Vec<Profile>,
        exclusions: &HashSet<String>,
        cancel: F,
    ) -> Result<Vec<RankedCandidate>, RankError>
    where
        F: Future<Output = ()> + Send,
    {
        subject.validate_as_subject()?;

        let roster: Vec<Profile> = dedupe_by_id(candidates)
            .into_iter()
            .filter(|candidate| candidate.id != subject.id && is_eligible(candidate, exclusions))
            .collect();

        tracing::debug!(
            "Ranking {} candidates for {} ({} exclusions)",
            roster.len(),
            subject.id,
            exclusions.len()
        );

        if roster.is_empty() {
            return Ok(Vec::new());
        }

        let cached = match self.cache.get(&subject.id).await {
            Ok(scores) => scores,
            Err(e) => {
                tracing::warn!("Score cache read failed for {}, scoring from scratch: {}", subject.id, e);
                HashMap::new()
            }
        };

        let missing: Vec<Profile> = roster
            .iter()
            .filter(|candidate| !cached.contains_key(&candidate.id))
            .cloned()
            .collect();

        let mut fresh: HashMap<String, CompatibilityScore> = HashMap::with_capacity(missing.len());

        if !missing.is_empty() {
            let external = self.ask_opinion(subject, &missing, cancel).await;

            for candidate in &missing {
                let score = match external.get(&candidate.id) {
                    Some(value) => CompatibilityScore::new(
                        subject.id.clone(),
                        candidate.id.clone(),
                        i64::from(*value),
                        ScoreSource::External,
                    ),
                    None => self.fallback_score(subject, candidate),
                };
                fresh.insert(candidate.id.clone(), score);
            }

            tracing::debug!(
                "Scored {} cache misses for {} ({} external)",
                missing.len(),
                subject.id,
                external.len()
            );

            if let Err(e) = self.cache.put(&subject.id, &fresh).await {
                tracing::warn!("Score cache write failed for {}: {}", subject.id, e);
            }
        }

        let today = Utc::now().date_naive();
        let weights = *self.scorer.weights();

        let mut ranked: Vec<RankedCandidate> = roster
            .into_iter()
            .filter_map(|profile| {
                let score = fresh
                    .remove(&profile.id)
                    .or_else(|| cached.get(&profile.id).cloned())?;
                let breakdown = score_breakdown(subject, &profile, &weights, today);
                Some(RankedCandidate {
                    profile,
                    score,
                    breakdown,
                })
            })
            .collect();

        // Vec::sort_by is stable, so equal scores keep roster order
        ranked.sort_by(|a, b| b.score.value.cmp(&a.score.value));

        Ok(ranked)
    }

    /// Ask the opinion source about `missing`, bounded by the timeout and `cancel`
    async fn ask_opinion<F>(
        &self,
        subject: &Profile,
        missing: &[Profile],
        cancel: F,
    ) -> HashMap<String, u8>
    where
        F: Future<Output = ()> + Send,
    {
        let request = tokio::time::timeout(
            self.opinion_timeout,
            self.opinion.score_batch(subject, missing),
        );

        tokio::select! {
            outcome = request => match outcome {
                Ok(scores) => scores,
                Err(_) => {
                    tracing::warn!(
                        "Opinion request for {} exceeded {:?}, using fallback",
                        subject.id,
                        self.opinion_timeout
                    );
                    HashMap::new()
                }
            },
            _ = cancel => {
                tracing::warn!("Opinion request for {} cancelled, using fallback", subject.id);
                HashMap::new()
            }
        }
    }

    fn fallback_score(&self, subject: &Profile, candidate: &Profile) -> CompatibilityScore {
        match self.fallback {
            FallbackStrategy::Deterministic => self.scorer.score(subject, candidate),
            FallbackStrategy::Random => CompatibilityScore::new(
                subject.id.clone(),
                candidate.id.clone(),
                rand::rng().random_range(FallbackStrategy::RANDOM_RANGE),
                ScoreSource::FallbackRandom,
            ),
        }
    }
}
