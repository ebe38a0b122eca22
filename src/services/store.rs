use async_trait::async_trait;
use thiserror::Error;

use crate::models::{MatchRequest, Profile};

/// Errors surfaced by the member directory and the request ledger
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to member profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Every profile eligible to be ranked, in directory order
    async fn list_candidates(&self) -> Result<Vec<Profile>, StoreError>;

    async fn get_profile(&self, id: &str) -> Result<Profile, StoreError>;
}

/// Read-only access to connection requests between members
#[async_trait]
pub trait RequestLedger: Send + Sync {
    /// Requests where `user_id` is the sender or the receiver
    async fn requests_involving(&self, user_id: &str) -> Result<Vec<MatchRequest>, StoreError>;

    async fn health_check(&self) -> bool {
        true
    }
}

/// Fixed, in-process directory of profiles and requests
///
/// Backs tests and local runs without Appwrite or Postgres.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    profiles: Vec<Profile>,
    requests: Vec<MatchRequest>,
}

impl MemoryDirectory {
    pub fn new(profiles: Vec<Profile>, requests: Vec<MatchRequest>) -> Self {
        Self { profiles, requests }
    }
}

#[async_trait]
impl ProfileStore for MemoryDirectory {
    async fn list_candidates(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(self.profiles.clone())
    }

    async fn get_profile(&self, id: &str) -> Result<Profile, StoreError> {
        self.profiles
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Profile {}", id)))
    }
}

#[async_trait]
impl RequestLedger for MemoryDirectory {
    async fn requests_involving(&self, user_id: &str) -> Result<Vec<MatchRequest>, StoreError> {
        Ok(self
            .requests
            .iter()
            .filter(|r| r.counterpart(user_id).is_some())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestStatus;

    #[tokio::test]
    async fn test_memory_directory_lookups() {
        let directory = MemoryDirectory::new(
            vec![Profile { id: "a".to_string(), ..Default::default() }],
            vec![MatchRequest {
                from_id: "a".to_string(),
                to_id: "b".to_string(),
                status: RequestStatus::Pending,
            }],
        );

        assert_eq!(directory.get_profile("a").await.unwrap().id, "a");
        assert!(matches!(directory.get_profile("z").await, Err(StoreError::NotFound(_))));
        assert_eq!(directory.requests_involving("b").await.unwrap().len(), 1);
        assert!(directory.requests_involving("c").await.unwrap().is_empty());
    }
}
