use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::models::Profile;
use crate::services::store::{ProfileStore, StoreError};

/// Errors that can occur when interacting with Appwrite
#[derive(Debug, Error)]
pub enum AppwriteError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: invalid API key or token")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl From<AppwriteError> for StoreError {
    fn from(value: AppwriteError) -> Self {
        match value {
            AppwriteError::NotFound(what) => StoreError::NotFound(what),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Member directory backed by an Appwrite collection
///
/// Reads member documents over the Appwrite REST API; the service never
/// writes to the collection.
pub struct AppwriteProfileStore {
    base_url: String,
    api_key: String,
    project_id: String,
    database_id: String,
    members_collection: String,
    page_size: usize,
    client: Client,
}

impl AppwriteProfileStore {
    /// Create a new Appwrite profile store
    pub fn new(
        base_url: String,
        api_key: String,
        project_id: String,
        database_id: String,
        members_collection: String,
    ) -> Result<Self, AppwriteError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            base_url,
            api_key,
            project_id,
            database_id,
            members_collection,
            page_size: 100,
            client,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/databases/{}/collections/{}/documents",
            self.base_url.trim_end_matches('/'),
            self.database_id,
            self.members_collection
        )
    }

    async fn get_json(&self, url: &str) -> Result<Value, AppwriteError> {
        let response = self
            .client
            .get(url)
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Project", &self.project_id)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppwriteError::NotFound(url.to_string()));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppwriteError::Unauthorized);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            tracing::error!("Appwrite request failed: {} - {}", status, body);
            return Err(AppwriteError::ApiError(format!("Request failed: {}", status)));
        }

        Ok(response.json().await?)
    }

    /// Fetch one page of member documents
    async fn list_page(&self, offset: usize) -> Result<(Vec<Profile>, usize, u64), AppwriteError> {
        let queries = vec![format!("limit({})", self.page_size), format!("offset({})", offset)];
        let queries_json = serde_json::to_string(&queries)
            .map_err(|e| AppwriteError::InvalidResponse(e.to_string()))?;
        let url = format!(
            "{}?queries={}",
            self.documents_url(),
            urlencoding::encode(&queries_json)
        );

        let json = self.get_json(&url).await?;

        let total = json.get("total").and_then(|t| t.as_u64()).unwrap_or(0);
        let documents = json
            .get("documents")
            .and_then(|d| d.as_array())
            .ok_or_else(|| AppwriteError::InvalidResponse("Missing documents array".into()))?;

        let profiles: Vec<Profile> = documents
            .iter()
            .filter_map(|doc| match document_to_profile(doc) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    tracing::debug!("Skipping unreadable member document: {}", e);
                    None
                }
            })
            .collect();

        Ok((profiles, documents.len(), total))
    }
}

#[async_trait]
impl ProfileStore for AppwriteProfileStore {
    async fn list_candidates(&self) -> Result<Vec<Profile>, StoreError> {
        let mut profiles = Vec::new();
        let mut offset = 0;

        loop {
            let (page, fetched, total) = self.list_page(offset).await?;
            profiles.extend(page);
            offset += fetched;

            if fetched < self.page_size || offset as u64 >= total {
                break;
            }
        }

        tracing::debug!("Listed {} member profiles", profiles.len());
        Ok(profiles)
    }

    async fn get_profile(&self, id: &str) -> Result<Profile, StoreError> {
        let url = format!("{}/{}", self.documents_url(), urlencoding::encode(id));
        tracing::debug!("Fetching profile for member: {}", id);

        let json = self.get_json(&url).await.map_err(|e| match e {
            AppwriteError::NotFound(_) => AppwriteError::NotFound(format!("Profile {}", id)),
            other => other,
        })?;

        Ok(document_to_profile(&json)?)
    }
}

/// Map an Appwrite document onto a profile, taking `$id` when `id` is absent
fn document_to_profile(doc: &Value) -> Result<Profile, AppwriteError> {
    let mut data = doc.get("data").unwrap_or(doc).clone();

    if let Some(obj) = data.as_object_mut() {
        if !obj.contains_key("id") {
            if let Some(doc_id) = doc.get("$id").cloned() {
                obj.insert("id".to_string(), doc_id);
            }
        }
    }

    serde_json::from_value(data)
        .map_err(|e| AppwriteError::InvalidResponse(format!("Failed to parse profile: {}", e)))
}
