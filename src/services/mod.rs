// Service exports
pub mod appwrite;
pub mod cache;
pub mod opinion;
pub mod postgres;
pub mod store;

pub use appwrite::{AppwriteError, AppwriteProfileStore};
pub use cache::{
    CacheEntry, CacheError, CacheKey, Clock, ManualClock, MemoryScoreStore, RedisScoreStore,
    ScoreCache, ScoreStore, SystemClock,
};
pub use opinion::{DisabledOpinion, GeminiOpinionClient, OpinionError, OpinionSource};
pub use postgres::{PostgresError, PostgresRequestLedger};
pub use store::{MemoryDirectory, ProfileStore, RequestLedger, StoreError};
