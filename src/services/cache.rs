use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::CompatibilityScore;

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

/// A stored score and the moment it was computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub score: CompatibilityScore,
    #[serde(rename = "computedAt")]
    pub computed_at: DateTime<Utc>,
}

/// Durable key-value persistence for scores, keyed by subject
///
/// Implementations must be safe to call concurrently and must merge entries
/// per candidate so that unrelated candidates never overwrite each other.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// All stored entries for a subject, fresh or not
    async fn load(&self, subject_id: &str) -> Result<HashMap<String, CacheEntry>, CacheError>;

    /// Merge entries into the subject's map, last write wins per candidate
    async fn store(
        &self,
        subject_id: &str,
        entries: &HashMap<String, CacheEntry>,
    ) -> Result<(), CacheError>;
}

/// Source of the current time for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let step = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(step, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// TTL-aware score cache
///
/// Expiry is a read-time decision: entries older than the TTL stay in the
/// store until overwritten but are never returned.
#[derive(Clone)]
pub struct ScoreCache {
    store: Arc<dyn ScoreStore>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl ScoreCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(store: Arc<dyn ScoreStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(5200)),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fresh scores for a subject, keyed by candidate id
    pub async fn get(
        &self,
        subject_id: &str,
    ) -> Result<HashMap<String, CompatibilityScore>, CacheError> {
        let now = self.clock.now();
        let entries = self.store.load(subject_id).await?;
        let total = entries.len();

        let fresh: HashMap<String, CompatibilityScore> = entries
            .into_iter()
            .filter(|(_, entry)| now.signed_duration_since(entry.computed_at) < self.ttl)
            .map(|(candidate_id, entry)| (candidate_id, entry.score))
            .collect();

        tracing::trace!(
            "Score cache for {}: {} fresh of {} stored",
            subject_id,
            fresh.len(),
            total
        );

        Ok(fresh)
    }

    /// Stamp scores with the current time and merge them into the store
    pub async fn put(
        &self,
        subject_id: &str,
        scores: &HashMap<String, CompatibilityScore>,
    ) -> Result<(), CacheError> {
        if scores.is_empty() {
            return Ok(());
        }

        let computed_at = self.clock.now();
        let entries: HashMap<String, CacheEntry> = scores
            .iter()
            .map(|(candidate_id, score)| {
                (
                    candidate_id.clone(),
                    CacheEntry {
                        score: score.clone(),
                        computed_at,
                    },
                )
            })
            .collect();

        self.store.store(subject_id, &entries).await?;
        tracing::trace!("Cached {} scores for {}", entries.len(), subject_id);
        Ok(())
    }
}

/// Redis-backed score store with an in-process L1 tier
///
/// Each subject is a Redis hash; a write is a single HSET so concurrent
/// writers only race on the same candidate field. The hash expires one TTL
/// after its last write.
///
/// The L1 tier is per process. Writes made by another instance stay
/// invisible here for up to `l1_ttl_secs`, which only costs repeated opinion
/// calls, never a wrong score. Within one process a read whose Redis
/// round-trip overlapped a completed write skips the L1 fill, so the older
/// map is not put back after the write invalidated it.
pub struct RedisScoreStore {
    redis: ConnectionManager,
    l1_cache: moka::future::Cache<String, Arc<HashMap<String, CacheEntry>>>,
    /// Bumped by every write, checked before a read fills L1
    generation: AtomicU64,
    ttl_secs: u64,
}

impl RedisScoreStore {
    /// Connect to Redis and build the L1 tier
    pub async fn new(
        redis_url: &str,
        l1_size: u64,
        l1_ttl_secs: u64,
        ttl_secs: u64,
    ) -> Result<Self, CacheError> {
        // EXPIRE 0 would delete every hash right after it is written
        if ttl_secs == 0 {
            return Err(CacheError::InvalidConfig("ttl_secs must be positive".into()));
        }

        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        let l1_cache = moka::future::CacheBuilder::new(l1_size)
            .time_to_live(Duration::from_secs(l1_ttl_secs))
            .build();

        Ok(Self {
            redis,
            l1_cache,
            generation: AtomicU64::new(0),
            ttl_secs,
        })
    }
}

#[async_trait]
impl ScoreStore for RedisScoreStore {
    async fn load(&self, subject_id: &str) -> Result<HashMap<String, CacheEntry>, CacheError> {
        let key = CacheKey::scores(subject_id);

        if let Some(entries) = self.l1_cache.get(&key).await {
            tracing::trace!("L1 cache hit: {}", key);
            return Ok(entries.as_ref().clone());
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let mut conn = self.redis.clone();
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(&key)
            .query_async(&mut conn)
            .await?;

        let mut entries = HashMap::with_capacity(raw.len());
        for (candidate_id, json) in raw {
            match serde_json::from_str::<CacheEntry>(&json) {
                Ok(entry) => {
                    entries.insert(candidate_id, entry);
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable cache entry {}/{}: {}", key, candidate_id, e);
                }
            }
        }

        tracing::trace!("L2 cache read: {} ({} entries)", key, entries.len());
        if self.generation.load(Ordering::SeqCst) == generation {
            self.l1_cache.insert(key, Arc::new(entries.clone())).await;
        }

        Ok(entries)
    }

    async fn store(
        &self,
        subject_id: &str,
        entries: &HashMap<String, CacheEntry>,
    ) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        let key = CacheKey::scores(subject_id);

        let mut hset = redis::cmd("HSET");
        hset.arg(&key);
        for (candidate_id, entry) in entries {
            hset.arg(candidate_id).arg(serde_json::to_string(entry)?);
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .add_command(hset)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_secs)
            .ignore();

        let mut conn = self.redis.clone();
        let _: () = pipe.query_async(&mut conn).await?;

        self.generation.fetch_add(1, Ordering::SeqCst);
        self.l1_cache.invalidate(&key).await;
        tracing::trace!("Cache set: {} (+{} entries)", key, entries.len());
        Ok(())
    }
}

/// In-process score store
///
/// Used by tests and when Redis is unreachable at start-up; contents do not
/// survive a restart.
#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    subjects: RwLock<HashMap<String, HashMap<String, CacheEntry>>>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn load(&self, subject_id: &str) -> Result<HashMap<String, CacheEntry>, CacheError> {
        let subjects = self.subjects.read().await;
        Ok(subjects.get(subject_id).cloned().unwrap_or_default())
    }

    async fn store(
        &self,
        subject_id: &str,
        entries: &HashMap<String, CacheEntry>,
    ) -> Result<(), CacheError> {
        let mut subjects = self.subjects.write().await;
        subjects
            .entry(subject_id.to_string())
            .or_default()
            .extend(entries.iter().map(|(id, entry)| (id.clone(), entry.clone())));
        Ok(())
    }
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Build the key holding a subject's scores
    pub fn scores(subject_id: &str) -> String {
        format!("scores:{}", subject_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreSource;

    fn scores(subject: &str, values: &[(&str, i64)]) -> HashMap<String, CompatibilityScore> {
        values
            .iter()
            .map(|(id, value)| {
                (
                    id.to_string(),
                    CompatibilityScore::new(subject, *id, *value, ScoreSource::Deterministic),
                )
            })
            .collect()
    }

    fn cache_with_clock() -> (ScoreCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = ScoreCache::new(Arc::new(MemoryScoreStore::new()), ScoreCache::DEFAULT_TTL)
            .with_clock(clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (cache, _) = cache_with_clock();

        cache.put("s", &scores("s", &[("a", 70), ("b", 40)])).await.unwrap();
        let fresh = cache.get("s").await.unwrap();

        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh["a"].value, 70);
        assert!(cache.get("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let (cache, clock) = cache_with_clock();

        cache.put("s", &scores("s", &[("a", 70)])).await.unwrap();
        clock.advance(ScoreCache::DEFAULT_TTL - Duration::from_secs(1));
        assert_eq!(cache.get("s").await.unwrap().len(), 1);

        clock.advance(Duration::from_secs(2));
        assert!(cache.get("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_merges_and_overwrites() {
        let (cache, clock) = cache_with_clock();

        cache.put("s", &scores("s", &[("a", 70), ("b", 40)])).await.unwrap();
        clock.advance(Duration::from_secs(60));
        cache.put("s", &scores("s", &[("b", 90), ("c", 10)])).await.unwrap();

        let fresh = cache.get("s").await.unwrap();
        assert_eq!(fresh.len(), 3);
        assert_eq!(fresh["a"].value, 70);
        assert_eq!(fresh["b"].value, 90);
    }

    #[tokio::test]
    async fn test_overwrite_refreshes_expiry() {
        let (cache, clock) = cache_with_clock();

        cache.put("s", &scores("s", &[("a", 70), ("b", 40)])).await.unwrap();
        clock.advance(Duration::from_secs(20 * 60 * 60));
        cache.put("s", &scores("s", &[("b", 41)])).await.unwrap();
        clock.advance(Duration::from_secs(5 * 60 * 60));

        let fresh = cache.get("s").await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh["b"].value, 41);
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_redis_store_round_trip() {
        let store = RedisScoreStore::new("redis://127.0.0.1:6379", 100, 60, 60)
            .await
            .expect("Failed to create store");
        let cache = ScoreCache::new(Arc::new(store), Duration::from_secs(60));

        cache.put("redis-test", &scores("redis-test", &[("a", 55)])).await.unwrap();
        let fresh = cache.get("redis-test").await.unwrap();
        assert_eq!(fresh["a"].value, 55);
    }

    #[tokio::test]
    async fn test_redis_store_rejects_zero_ttl() {
        let result = RedisScoreStore::new("redis://127.0.0.1:6379", 100, 60, 0).await;
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_redis_write_is_visible_after_l1_fill() {
        let store = RedisScoreStore::new("redis://127.0.0.1:6379", 100, 60, 60)
            .await
            .expect("Failed to create store");
        let cache = ScoreCache::new(Arc::new(store), Duration::from_secs(60));

        cache.put("redis-l1", &scores("redis-l1", &[("a", 10)])).await.unwrap();
        assert_eq!(cache.get("redis-l1").await.unwrap().len(), 1);

        cache.put("redis-l1", &scores("redis-l1", &[("b", 20)])).await.unwrap();
        let fresh = cache.get("redis-l1").await.unwrap();
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh["b"].value, 20);
    }

    #[test]
    fn test_cache_key_builder() {
        assert_eq!(CacheKey::scores("user123"), "scores:user123");
    }
}
