use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use mujtamauna_match::config::{LoggingSettings, Settings};
use mujtamauna_match::core::{CompatibilityScorer, Ranker};
use mujtamauna_match::models::ScoringWeights;
use mujtamauna_match::routes::{self, AppState};
use mujtamauna_match::services::{
    AppwriteProfileStore, DisabledOpinion, GeminiOpinionClient, MemoryScoreStore, OpinionSource,
    PostgresRequestLedger, RedisScoreStore, ScoreCache, ScoreStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

/// `RUST_LOG` wins over the configured level when set
fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match logging.format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "compact" => subscriber.compact().init(),
        _ => subscriber.json().init(),
    }
}

fn startup_error(what: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", what, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", what, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => {
            init_tracing(&settings.logging);
            settings
        }
        Err(e) => {
            init_tracing(&LoggingSettings::default());
            return Err(startup_error("Failed to load configuration", e));
        }
    };

    info!("Starting Mujtamauna match service...");

    let mut profile_store = AppwriteProfileStore::new(
        settings.appwrite.endpoint.clone(),
        settings.appwrite.api_key.clone(),
        settings.appwrite.project_id.clone(),
        settings.appwrite.database_id.clone(),
        settings.collection.members.clone(),
    )
    .map_err(|e| startup_error("Failed to build Appwrite client", e))?;
    if let Some(page_size) = settings.appwrite.page_size {
        profile_store = profile_store.with_page_size(page_size);
    }
    let profiles = Arc::new(profile_store);

    info!("Appwrite profile store initialized");

    let ledger = Arc::new(
        PostgresRequestLedger::from_settings(
            &settings.database.url,
            settings.database.max_connections,
            settings.database.min_connections,
            settings.database.acquire_timeout_secs,
            settings.database.idle_timeout_secs,
        )
        .await
        .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?,
    );

    info!("PostgreSQL request ledger initialized");

    // Scores are recomputable, so a missing Redis only costs repeated work
    let cache_settings = &settings.cache;
    let score_store: Arc<dyn ScoreStore> = match RedisScoreStore::new(
        &cache_settings.redis_url,
        cache_settings.l1_cache_size,
        cache_settings.l1_ttl_secs,
        cache_settings.ttl_secs,
    )
    .await
    {
        Ok(store) => {
            info!(
                "Score cache initialized (L1: {} entries, TTL: {}s)",
                cache_settings.l1_cache_size, cache_settings.ttl_secs
            );
            Arc::new(store)
        }
        Err(e) => {
            error!("Failed to connect to Redis ({}), caching scores in memory", e);
            Arc::new(MemoryScoreStore::new())
        }
    };
    let cache = ScoreCache::new(score_store, Duration::from_secs(cache_settings.ttl_secs));

    let opinion_timeout = Duration::from_secs(settings.opinion.timeout_secs);
    let opinion: Arc<dyn OpinionSource> = match settings.opinion.api_key.as_deref() {
        Some(api_key) => {
            let client = GeminiOpinionClient::new(
                settings.opinion.endpoint.clone(),
                api_key,
                settings.opinion.model.clone(),
                opinion_timeout,
            )
            .map_err(|e| startup_error("Failed to build opinion client", e))?
            .with_temperature(settings.opinion.temperature);

            info!("Opinion client initialized (model: {})", settings.opinion.model);
            Arc::new(client)
        }
        None => {
            warn!("No opinion API key configured, using fallback scores only");
            Arc::new(DisabledOpinion)
        }
    };

    let weights = ScoringWeights::from(&settings.scoring.weights);
    let ranker = Ranker::new(CompatibilityScorer::new(weights), opinion, cache)
        .with_opinion_timeout(opinion_timeout)
        .with_fallback(settings.ranking.fallback.into());

    info!("Ranker initialized with weights: {:?}", weights);

    let app_state = AppState {
        profiles,
        ledger,
        ranker,
        default_limit: settings.ranking.default_limit,
        max_limit: settings.ranking.max_limit,
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
