mod rate_limit;

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Json, Path as AxumPath, Query, State};
use axum::http::{header, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use leafcare_agents::{AdvisorError, AnalysisRequest, PlantCareAdvisor};
use leafcare_core::{GrowthStage, HealthResponse};
use leafcare_observability::{AppMetrics, MetricsSnapshot};
use leafcare_vision::ValidationErrorKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use crate::rate_limit::{Admission, IpRateLimiter};

pub const DEFAULT_API_KEY: &str = "dev-leafcare-key";
const DETECT_PATH: &str = "/v1/detect";
const MIB: usize = 1024 * 1024;

#[derive(Clone)]
pub struct ApiState {
    pub advisor: Arc<PlantCareAdvisor>,
    pub api_key: String,
    pub limiter: IpRateLimiter,
    pub body_limit_bytes: usize,
}

impl ApiState {
    pub fn new(advisor: PlantCareAdvisor, api_key: impl Into<String>, limiter: IpRateLimiter) -> Self {
        // Headroom over the validator's cap so oversize uploads still get its TOO_LARGE body.
        let body_limit_bytes = (advisor.config().image.max_size_mb * MIB as f64).ceil() as usize + MIB;
        Self {
            advisor: Arc::new(advisor),
            api_key: api_key.into(),
            limiter,
            body_limit_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthPayload {
    #[serde(flatten)]
    health: HealthResponse,
    timestamp_utc: String,
    metrics: MetricsSnapshot,
}

#[derive(Debug, Default, Deserialize)]
struct DetectQuery {
    filename: Option<String>,
    language: Option<String>,
    crop_type: Option<String>,
    growth_stage: Option<String>,
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LanguageQuery {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DosageRequest {
    disease_id: String,
    remedy_name: String,
    requested_dosage: String,
}

/// Loads config and knowledge base, then reads the server knobs from the environment.
pub async fn build_app(config_path: Option<PathBuf>, kb_path: impl AsRef<Path>) -> Result<Router> {
    let kb_path = kb_path.as_ref().to_path_buf();
    let metrics = AppMetrics::shared();
    // Artifact loading and YAML parsing are blocking file reads.
    let advisor = tokio::task::spawn_blocking(move || {
        PlantCareAdvisor::load(config_path.as_deref(), &kb_path, metrics)
    })
    .await
    .context("advisor loader task panicked")??;

    let api_key = env::var("LEAFCARE_API_KEY")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_API_KEY.to_string());
    let window = Duration::from_secs(env_parse("LEAFCARE_RATE_LIMIT_WINDOW_SECONDS", 60u64));
    let max_requests = env_parse("LEAFCARE_RATE_LIMIT_MAX", 30usize);

    let state = ApiState::new(advisor, api_key, IpRateLimiter::new(window, max_requests));
    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(DETECT_PATH, post(detect))
        .route("/v1/treatments/:disease_id", get(treatment_lookup))
        .route("/v1/diseases", get(list_diseases))
        .route("/v1/dosage/validate", post(validate_dosage))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(state.body_limit_bytes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            oversize_body_middleware,
        ))
        // Added before the key check so only authenticated detections spend budget.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthPayload {
        health: state.advisor.health(),
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.advisor.metrics().snapshot(),
    };
    (StatusCode::OK, Json(payload))
}

async fn detect(
    State(state): State<ApiState>,
    Query(query): Query<DetectQuery>,
    body: Bytes,
) -> Response {
    let language = query.language.clone();
    let growth_stage = match query.growth_stage.as_deref() {
        None => None,
        Some(raw) => match GrowthStage::parse(raw) {
            Some(stage) => Some(stage),
            None => {
                return bad_request(
                    &state,
                    format!("unknown growth stage '{raw}'"),
                    language.as_deref(),
                )
            }
        },
    };
    let request = AnalysisRequest {
        crop_type: query.crop_type,
        growth_stage,
        location: query.location,
        language: query.language,
    };
    let filename = query.filename.unwrap_or_default();

    let advisor = state.advisor.clone();
    let outcome =
        tokio::task::spawn_blocking(move || advisor.analyze_image(&body, &filename, request)).await;

    match outcome {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(Err(err)) => {
            let body = state.advisor.error_response(&err, language.as_deref());
            (error_status(&err), Json(body)).into_response()
        }
        Err(join_error) => {
            warn!(error = %join_error, "detection task failed");
            let body = state.advisor.formatter().format_error_response(
                "internal error while analyzing the image".to_string(),
                "INTERNAL_ERROR",
                language.as_deref(),
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn treatment_lookup(
    State(state): State<ApiState>,
    AxumPath(disease_id): AxumPath<String>,
    Query(query): Query<LanguageQuery>,
) -> Response {
    match state
        .advisor
        .treatment_info(&disease_id, query.language.as_deref())
    {
        Ok(response) if response.error.is_some() => {
            (StatusCode::NOT_FOUND, Json(response)).into_response()
        }
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => {
            let body = state
                .advisor
                .error_response(&err, query.language.as_deref());
            (error_status(&err), Json(body)).into_response()
        }
    }
}

async fn list_diseases(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.advisor.list_diseases())
}

async fn validate_dosage(
    State(state): State<ApiState>,
    Json(input): Json<DosageRequest>,
) -> impl IntoResponse {
    let report = state.advisor.validate_dosage(
        &input.disease_id,
        &input.remedy_name,
        &input.requested_dosage,
    );
    (StatusCode::OK, Json(report))
}

fn error_status(err: &AdvisorError) -> StatusCode {
    match err.validation_kind() {
        Some(ValidationErrorKind::TooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
        Some(ValidationErrorKind::UnsupportedFormat) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Some(ValidationErrorKind::TooSmall | ValidationErrorKind::Corrupt) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn bad_request(state: &ApiState, message: String, language: Option<&str>) -> Response {
    let body = state
        .advisor
        .formatter()
        .format_error_response(message, "INVALID_REQUEST", language);
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if keys_match(header_key, &state.api_key) {
        return next.run(request).await;
    }

    info!(path = %request.uri().path(), "rejected request without a valid api key");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "unauthorized",
            "message": "missing or invalid x-api-key"
        })),
    )
        .into_response()
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.uri().path() != DETECT_PATH {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    match state.limiter.admit(&ip) {
        Admission::Allowed { .. } => next.run(request).await,
        Admission::Limited { retry_after } => {
            warn!(ip = %ip, tracked = state.limiter.tracked_clients(), "detection rate limit exceeded");
            let retry_secs = retry_after.as_secs().max(1);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_secs.to_string())],
                Json(serde_json::json!({
                    "error": "rate_limited",
                    "message": "rate limit exceeded for this IP",
                    "retry_after_seconds": retry_secs
                })),
            )
                .into_response()
        }
    }
}

/// Rewrites the transport limit's plain-text 413 into the structured error body.
async fn oversize_body_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let language = Query::<LanguageQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.language);
    let response = next.run(request).await;
    if response.status() != StatusCode::PAYLOAD_TOO_LARGE || is_json(&response) {
        return response;
    }

    let max_size_mb = state.advisor.config().image.max_size_mb;
    let body = state.advisor.formatter().format_error_response(
        format!("File too large. Maximum size: {max_size_mb} MB"),
        "TOO_LARGE",
        language.as_deref(),
    );
    (StatusCode::PAYLOAD_TOO_LARGE, Json(body)).into_response()
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/health")
}

/// Compares digests so the check does not short-circuit on the first differing byte.
fn keys_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string()
        })
        .unwrap_or_else(|| "local".to_string())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}
