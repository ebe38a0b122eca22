use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::core::FallbackStrategy;
use crate::models::ScoringWeights;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub appwrite: AppwriteSettings,
    pub collection: CollectionSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub opinion: OpinionSettings,
    #[serde(default)]
    pub ranking: RankingSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppwriteSettings {
    pub endpoint: String,
    pub api_key: String,
    pub project_id: String,
    pub database_id: String,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSettings {
    pub members: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_l1_cache_size")]
    pub l1_cache_size: u64,
    #[serde(default = "default_l1_ttl")]
    pub l1_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            ttl_secs: default_cache_ttl(),
            l1_cache_size: default_l1_cache_size(),
            l1_ttl_secs: default_l1_ttl(),
        }
    }
}

fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_cache_ttl() -> u64 { 24 * 60 * 60 }
fn default_l1_cache_size() -> u64 { 1000 }
fn default_l1_ttl() -> u64 { 60 }

/// Text-generation service used for opinion scores
#[derive(Debug, Clone, Deserialize)]
pub struct OpinionSettings {
    #[serde(default = "default_opinion_endpoint")]
    pub endpoint: String,
    /// Without a key the service runs on fallback scores only
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_opinion_model")]
    pub model: String,
    #[serde(default = "default_opinion_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OpinionSettings {
    fn default() -> Self {
        Self {
            endpoint: default_opinion_endpoint(),
            api_key: None,
            model: default_opinion_model(),
            timeout_secs: default_opinion_timeout(),
            temperature: default_temperature(),
        }
    }
}

fn default_opinion_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_opinion_model() -> String { "gemini-3-flash-preview".to_string() }
fn default_opinion_timeout() -> u64 { 8 }
fn default_temperature() -> f32 { 0.1 }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackSetting {
    #[default]
    Deterministic,
    Random,
}

impl From<FallbackSetting> for FallbackStrategy {
    fn from(value: FallbackSetting) -> Self {
        match value {
            FallbackSetting::Deterministic => FallbackStrategy::Deterministic,
            FallbackSetting::Random => FallbackStrategy::Random,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingSettings {
    #[serde(default)]
    pub fallback: FallbackSetting,
    #[serde(default = "default_limit")]
    pub default_limit: u16,
    #[serde(default = "default_max_limit")]
    pub max_limit: u16,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            fallback: FallbackSetting::default(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_limit() -> u16 { 20 }
fn default_max_limit() -> u16 { 100 }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: WeightsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_age_weight")]
    pub age: f64,
    #[serde(default = "default_city_weight")]
    pub city: f64,
    #[serde(default = "default_interests_weight")]
    pub interests: f64,
    #[serde(default = "default_education_weight")]
    pub education: f64,
    #[serde(default = "default_age_window")]
    pub age_window_years: u8,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            age: default_age_weight(),
            city: default_city_weight(),
            interests: default_interests_weight(),
            education: default_education_weight(),
            age_window_years: default_age_window(),
        }
    }
}

impl From<&WeightsConfig> for ScoringWeights {
    fn from(value: &WeightsConfig) -> Self {
        Self {
            age: value.age,
            city: value.city,
            interests: value.interests,
            education: value.education,
            age_window_years: value.age_window_years,
        }
    }
}

fn default_age_weight() -> f64 { 50.0 }
fn default_city_weight() -> f64 { 20.0 }
fn default_interests_weight() -> f64 { 20.0 }
fn default_education_weight() -> f64 { 10.0 }
fn default_age_window() -> u8 { 5 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with MUJTAMAUNA__)
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., MUJTAMAUNA__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("MUJTAMAUNA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = substitute_env_vars(settings)?;

        let settings: Self = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("MUJTAMAUNA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that deserialize fine but cannot work at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Message("cache.ttl_secs must be positive".into()));
        }
        if self.ranking.max_limit == 0 {
            return Err(ConfigError::Message("ranking.max_limit must be positive".into()));
        }
        Ok(())
    }
}

/// Pull secrets from their conventional environment variables
///
/// `DATABASE_URL` and `GEMINI_API_KEY` (or `API_KEY`) override whatever the
/// files or prefixed variables set. Unset variables leave those values alone.
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let database_url = env::var("DATABASE_URL").ok();
    let opinion_key = env::var("GEMINI_API_KEY").or_else(|_| env::var("API_KEY")).ok();

    apply_secret_overrides(settings, database_url, opinion_key)
}

fn apply_secret_overrides(
    settings: Config,
    database_url: Option<String>,
    opinion_key: Option<String>,
) -> Result<Config, ConfigError> {
    let mut builder = Config::builder().add_source(settings);

    if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
        builder = builder.set_override("database.url", url)?;
    }
    if let Some(key) = opinion_key.filter(|k| !k.trim().is_empty()) {
        builder = builder.set_override("opinion.api_key", key)?;
    }

    builder.build()
}
