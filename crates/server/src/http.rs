use std::{net::SocketAddr, path::Path, sync::Arc};

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Extension},
    http::{
        header::{CONTENT_TYPE, USER_AGENT},
        HeaderMap, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use visitlog_store::{
    sanitize, VisitLog, VisitRecord, FIELD_FALLBACK, MAX_IP_LEN, MAX_TIMEZONE_LEN,
    MAX_USER_AGENT_LEN,
};

/// Most records returned by the latest-visits endpoint.
pub const MAX_RETURNED_RECORDS: usize = 100;

/// Request bodies larger than this are rejected before parsing.
pub const MAX_BODY_BYTES: usize = 5 * 1024;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: VisitLog,
}

impl AppState {
    pub fn new(store: VisitLog) -> Self {
        Self {
            inner: Arc::new(AppStateInner { store }),
        }
    }

    fn store(&self) -> &VisitLog {
        &self.inner.store
    }
}

#[derive(Debug)]
enum ApiError {
    Internal(anyhow::Error),
}

impl ApiError {
    fn internal<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Internal(err) => {
                tracing::error!("Unexpected error while handling request: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "ok": false, "message": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

/// Assemble the application router.
///
/// When `assets_dir` is given, it is served verbatim as the fallback so the
/// front-end page can live next to the API.
pub fn build_router(state: AppState, assets_dir: Option<&Path>) -> Router {
    let mut router = Router::new()
        .route("/api/visit", post(record_visit))
        .route("/api/visits/latest", get(latest_visits))
        .route("/api/visits/count", get(visit_count))
        .route("/health", get(health));

    if let Some(dir) = assets_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(Extension(state))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct VisitBody {
    timezone: Option<String>,
}

#[derive(Serialize)]
struct LatestResponse {
    entries: Vec<VisitRecord>,
}

async fn record_visit(
    Extension(state): Extension<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<VisitBody>,
) -> Result<Response, ApiError> {
    let ip = sanitize(
        Some(&client_ip(&headers, peer)),
        FIELD_FALLBACK,
        MAX_IP_LEN,
    );
    let timezone = sanitize(body.timezone.as_deref(), FIELD_FALLBACK, MAX_TIMEZONE_LEN);
    let user_agent = sanitize(
        headers.get(USER_AGENT).and_then(|value| value.to_str().ok()),
        FIELD_FALLBACK,
        MAX_USER_AGENT_LEN,
    );

    let record = VisitRecord::new(ip, timezone, user_agent);
    state.store().append(&record).map_err(ApiError::internal)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "recordedAt": record.timestamp })),
    )
        .into_response())
}

async fn latest_visits(
    Extension(state): Extension<AppState>,
) -> Result<Json<LatestResponse>, ApiError> {
    let entries = state
        .store()
        .read_tail(MAX_RETURNED_RECORDS)
        .map_err(ApiError::internal)?;

    Ok(Json(LatestResponse { entries }))
}

async fn visit_count(Extension(state): Extension<AppState>) -> Result<Response, ApiError> {
    let count = state.store().count().map_err(ApiError::internal)?;

    Ok(Json(json!({ "count": count })).into_response())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Resolve the client address, honoring exactly one reverse-proxy hop.
///
/// The last `X-Forwarded-For` entry is the value appended by the adjacent
/// proxy; anything before it is client-controlled and not trusted.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.rsplit(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
}
