use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

use crate::models::Profile;

/// Errors that can occur when asking the text-generation service for scores
///
/// Callers never branch on these; they only decide what gets logged.
#[derive(Debug, Error)]
pub enum OpinionError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Unauthorized: API key rejected ({0})")]
    Unauthorized(StatusCode),

    #[error("Quota exceeded")]
    QuotaExceeded,

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Best-effort external scoring of a batch of candidates
///
/// Returns whatever the source managed to score, keyed by candidate id.
/// Missing ids mean "no opinion"; implementations never fail.
#[async_trait]
pub trait OpinionSource: Send + Sync {
    async fn score_batch(&self, subject: &Profile, candidates: &[Profile]) -> HashMap<String, u8>;
}

/// Opinion source used when no API key is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledOpinion;

#[async_trait]
impl OpinionSource for DisabledOpinion {
    async fn score_batch(&self, _subject: &Profile, _candidates: &[Profile]) -> HashMap<String, u8> {
        HashMap::new()
    }
}

/// Gemini `generateContent` client producing personality-based scores
pub struct GeminiOpinionClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
    temperature: f32,
}

impl GeminiOpinionClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OpinionError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
            temperature: 0.1,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// One batched request for every candidate passed in
    pub async fn request_scores(
        &self,
        subject: &Profile,
        candidates: &[Profile],
    ) -> Result<HashMap<String, u8>, OpinionError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );

        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![PromptPart {
                    text: build_prompt(subject, candidates),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: self.temperature,
            },
        };

        tracing::debug!(
            "Requesting opinion scores for {} candidates of {}",
            candidates.len(),
            subject.id
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(OpinionError::Unauthorized(status));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OpinionError::QuotaExceeded);
        }
        if !status.is_success() {
            return Err(OpinionError::ApiError(format!(
                "generateContent returned {}",
                status
            )));
        }

        let raw = response.text().await?;
        let parsed: GenerateResponse = serde_json::from_str(&raw)
            .map_err(|e| OpinionError::MalformedResponse(format!("envelope: {}", e)))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();

        let requested: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        parse_score_map(&text, &requested)
    }
}

#[async_trait]
impl OpinionSource for GeminiOpinionClient {
    async fn score_batch(&self, subject: &Profile, candidates: &[Profile]) -> HashMap<String, u8> {
        if candidates.is_empty() {
            return HashMap::new();
        }

        let outcome = tokio::time::timeout(self.timeout, self.request_scores(subject, candidates))
            .await
            .unwrap_or(Err(OpinionError::Timeout(self.timeout)));

        match outcome {
            Ok(scores) => {
                tracing::debug!(
                    "Opinion service scored {} of {} candidates for {}",
                    scores.len(),
                    candidates.len(),
                    subject.id
                );
                scores
            }
            Err(e) => {
                tracing::warn!(
                    "Opinion service unavailable for {} ({} candidates): {}",
                    subject.id,
                    candidates.len(),
                    e
                );
                HashMap::new()
            }
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<PromptPart>,
}

#[derive(Serialize)]
struct PromptPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Serialize)]
struct MemberSummary<'a> {
    id: &'a str,
    bio: &'a str,
}

fn build_prompt(subject: &Profile, candidates: &[Profile]) -> String {
    let members: Vec<MemberSummary<'_>> = candidates
        .iter()
        .map(|c| MemberSummary {
            id: &c.id,
            bio: &c.bio,
        })
        .collect();
    let members_json = serde_json::to_string(&members).unwrap_or_else(|_| "[]".to_string());

    let name = if subject.name.is_empty() { "this member" } else { subject.name.as_str() };
    let mut about = Vec::new();
    if !subject.city.is_empty() {
        about.push(format!("lives in {}", subject.city));
    }
    if !subject.interests.is_empty() {
        about.push(format!("interests: {}", subject.interests.join(", ")));
    }
    if !subject.bio.is_empty() {
        about.push(format!("bio: {}", subject.bio));
    }

    format!(
        "Provide match scores (0-100) for {} ({}) based on personality. \
         Return ONLY a JSON object mapping IDs to numbers. Members: {}",
        name,
        about.join("; "),
        members_json
    )
}

/// Pull an id -> score mapping out of model text
///
/// Accepts a bare object, an object wrapped in prose or code fences, or an
/// array of `{ "id", "score" }` objects. Values that are not numbers (or
/// numeric strings) and ids that were not asked for are dropped.
pub fn parse_score_map(
    text: &str,
    requested: &HashSet<&str>,
) -> Result<HashMap<String, u8>, OpinionError> {
    let value = extract_json(text)?;

    let pairs: Vec<(String, &Value)> = match &value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let id = match item.get("id")? {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((id, item.get("score")?))
            })
            .collect(),
        _ => return Err(OpinionError::MalformedResponse("expected object or array".into())),
    };

    Ok(pairs
        .into_iter()
        .filter(|(id, _)| requested.contains(id.as_str()))
        .filter_map(|(id, v)| value_to_score(v).map(|score| (id, score)))
        .collect())
}

/// First parseable `{...}` or `[...]` span, trying whichever opens earlier first
///
/// Stray brackets in surrounding prose make that span fail to parse, in which
/// case the other kind is tried.
fn extract_json(text: &str) -> Result<Value, OpinionError> {
    let mut spans: Vec<(usize, char)> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| text.find(open).map(|start| (start, close)))
        .collect();
    spans.sort_by_key(|(start, _)| *start);

    if spans.is_empty() {
        return Err(OpinionError::MalformedResponse("no JSON found".into()));
    }

    let mut last_error = String::from("unterminated JSON");
    for (start, close) in spans {
        let Some(end) = text.rfind(close).filter(|end| *end > start) else {
            continue;
        };
        match serde_json::from_str::<Value>(&text[start..=end]) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(OpinionError::MalformedResponse(last_error))
}

fn value_to_score(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}
