use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use validator::Validate;

use crate::core::{apply_filters, exclusion_set, opposite_gender, reasons, RankError, Ranker};
use crate::models::{
    CompatibilityQuery, CompatibilityResponse, ErrorResponse, HealthResponse, RecommendRequest,
    RecommendResponse, RecommendationView,
};
use crate::services::{ProfileStore, RequestLedger, StoreError};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub profiles: Arc<dyn ProfileStore>,
    pub ledger: Arc<dyn RequestLedger>,
    pub ranker: Ranker,
    pub default_limit: u16,
    pub max_limit: u16,
}

/// Configure all recommendation routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/recommendations", web::post().to(recommend))
        .route("/compatibility", web::get().to(compatibility));
}

fn error_response(status: actix_web::http::StatusCode, error: &str, message: String) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message,
        status_code: status.as_u16(),
    })
}

fn store_failure(error: &str, err: StoreError) -> HttpResponse {
    use actix_web::http::StatusCode;

    match err {
        StoreError::NotFound(what) => error_response(StatusCode::NOT_FOUND, error, what),
        other => error_response(StatusCode::BAD_GATEWAY, error, other.to_string()),
    }
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let ledger_healthy = state.ledger.health_check().await;

    let status = if ledger_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Recommendations endpoint
///
/// POST /api/v1/recommendations
///
/// Request body:
/// ```json
/// {
///   "userId": "string",
///   "limit": 20,
///   "excludeUserIds": ["string"],
///   "oppositeGenderOnly": true,
///   "lang": "ar|en",
///   "filters": {
///     "minAge": 18, "maxAge": 80,
///     "cities": [], "education": [], "religion": [], "interests": []
///   }
/// }
/// ```
async fn recommend(state: web::Data<AppState>, req: web::Json<RecommendRequest>) -> impl Responder {
    use actix_web::http::StatusCode;

    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for recommend request: {:?}", errors);
        return error_response(StatusCode::BAD_REQUEST, "Validation failed", errors.to_string());
    }

    let user_id = &req.user_id;
    let limit = usize::from(req.limit.unwrap_or(state.default_limit).min(state.max_limit));
    let request_id = uuid::Uuid::new_v4();

    tracing::info!(%request_id, "Building recommendations for {}, limit: {}", user_id, limit);

    let subject = match state.profiles.get_profile(user_id).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!("Failed to fetch profile for {}: {}", user_id, e);
            return store_failure("Failed to fetch member profile", e);
        }
    };

    let mut candidates = match state.profiles.list_candidates().await {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::error!("Failed to list candidates for {}: {}", user_id, e);
            return store_failure("Failed to list candidates", e);
        }
    };

    // Without the ledger, members with open requests could resurface
    let requests = match state.ledger.requests_involving(user_id).await {
        Ok(requests) => requests,
        Err(e) => {
            tracing::error!("Failed to load connection requests for {}: {}", user_id, e);
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Failed to load connection requests",
                e.to_string(),
            );
        }
    };

    let mut exclusions = exclusion_set(user_id, &requests);
    exclusions.extend(req.exclude_user_ids.iter().cloned());

    if req.opposite_gender_only {
        candidates = opposite_gender(&subject, candidates);
    }
    candidates = apply_filters(candidates, &req.filters);
    let total_candidates = candidates.len();

    let ranked = match state.ranker.rank(&subject, candidates, &exclusions).await {
        Ok(ranked) => ranked,
        Err(RankError::InvalidSubject(e)) => {
            tracing::error!("Stored profile for {} is not a valid subject: {}", user_id, e);
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, "Invalid member profile", e.to_string());
        }
    };

    let recommendations: Vec<RecommendationView> = ranked
        .into_iter()
        .take(limit)
        .map(|candidate| RecommendationView {
            reasons: reasons(&candidate.breakdown, req.lang),
            score: candidate.score.value,
            source: candidate.score.source,
            breakdown: candidate.breakdown,
            profile: candidate.profile,
        })
        .collect();

    tracing::info!(
        %request_id,
        "Returning {} recommendations (from {} candidates, {} excluded)",
        recommendations.len(),
        total_candidates,
        exclusions.len()
    );

    HttpResponse::Ok().json(RecommendResponse {
        recommendations,
        total_candidates,
    })
}

/// Pairwise compatibility endpoint
///
/// GET /api/v1/compatibility?subjectId={id}&candidateId={id}&lang={ar|en}
///
/// Always the deterministic score; neither the cache nor the opinion
/// service is consulted.
async fn compatibility(
    state: web::Data<AppState>,
    query: web::Query<CompatibilityQuery>,
) -> impl Responder {
    use actix_web::http::StatusCode;

    if let Err(errors) = query.validate() {
        return error_response(StatusCode::BAD_REQUEST, "Validation failed", errors.to_string());
    }

    let subject = match state.profiles.get_profile(&query.subject_id).await {
        Ok(profile) => profile,
        Err(e) => return store_failure("Failed to fetch subject profile", e),
    };
    let candidate = match state.profiles.get_profile(&query.candidate_id).await {
        Ok(profile) => profile,
        Err(e) => return store_failure("Failed to fetch candidate profile", e),
    };

    let scorer = state.ranker.scorer();
    let score = scorer.score(&subject, &candidate);
    let breakdown = scorer.breakdown(&subject, &candidate);

    HttpResponse::Ok().json(CompatibilityResponse {
        subject_id: score.subject_id,
        candidate_id: score.candidate_id,
        score: score.value,
        reasons: reasons(&breakdown, query.lang),
        breakdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CompatibilityScorer;
    use actix_web::http::StatusCode;
    use crate::models::{Gender, MatchRequest, Profile, RequestStatus};
    use crate::services::{DisabledOpinion, MemoryDirectory, MemoryScoreStore, ScoreCache};
    use actix_web::{test, App};
    use serde_json::{json, Value};

    fn member(id: &str, gender: Gender, age: u8, city: &str) -> Profile {
        Profile {
            id: id.to_string(),
            gender: Some(gender),
            age: Some(age),
            city: city.to_string(),
            ..Default::default()
        }
    }

    fn state() -> AppState {
        let directory = Arc::new(MemoryDirectory::new(
            vec![
                member("me", Gender::Male, 30, "الخرطوم"),
                member("f1", Gender::Female, 29, "الخرطوم"),
                member("f2", Gender::Female, 30, "عطبرة"),
                member("f3", Gender::Female, 31, "الخرطوم"),
                member("m1", Gender::Male, 30, "الخرطوم"),
            ],
            vec![MatchRequest {
                from_id: "f3".to_string(),
                to_id: "me".to_string(),
                status: RequestStatus::Accepted,
            }],
        ));
        let cache = ScoreCache::new(Arc::new(MemoryScoreStore::new()), ScoreCache::DEFAULT_TTL);

        AppState {
            profiles: directory.clone(),
            ledger: directory,
            ranker: Ranker::new(CompatibilityScorer::default(), Arc::new(DisabledOpinion), cache),
            default_limit: 20,
            max_limit: 100,
        }
    }

    #[actix_web::test]
    async fn test_recommendations_exclude_and_rank() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/recommendations")
            .set_json(json!({ "userId": "me", "lang": "en" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let ids: Vec<&str> = body["recommendations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["profile"]["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["f1", "f2"]);
        assert_eq!(body["recommendations"][0]["score"], 60);
        assert_eq!(body["recommendations"][0]["source"], "deterministic");
        assert_eq!(body["recommendations"][0]["reasons"][1], "Lives in the same city");
        assert_eq!(body["totalCandidates"], 3);
    }

    #[actix_web::test]
    async fn test_discovery_filters_narrow_the_pool() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/recommendations")
            .set_json(json!({ "userId": "me", "filters": { "cities": ["عطبرة"] } }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["totalCandidates"], 1);
        assert_eq!(body["recommendations"][0]["profile"]["id"], "f2");

        let req = test::TestRequest::post()
            .uri("/api/v1/recommendations")
            .set_json(json!({ "userId": "me", "filters": { "minAge": 40, "maxAge": 30 } }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_unknown_member_is_not_found() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/recommendations")
            .set_json(json!({ "userId": "ghost" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_compatibility_endpoint() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/v1/compatibility?subjectId=me&candidateId=f2")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["score"], 50);
        assert_eq!(body["breakdown"]["sameCity"], false);
        assert_eq!(body["reasons"][1], "مدن مختلفة");
    }
}
