//! HTTP API over the time zone search system.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::{
        Query,
        State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    error::{Error, Result},
    timezones::{SearchRequest, SearchResults, TimeZoneSearchSystem},
};

pub const DEFAULT_PORT: u16 = 8080;

type AppState = Arc<TimeZoneSearchSystem>;

/// Error body returned by every failing route: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        if e.is_user_error() {
            Self::bad_request(e.to_string())
        } else {
            error!(error = %e, "search failed");
            Self::internal(e.to_string())
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::bad_request(e.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::bad_request(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Query string of `GET /search`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
    dst: Option<bool>,
    offset: Option<String>,
}

impl From<SearchParams> for SearchRequest {
    fn from(p: SearchParams) -> Self {
        SearchRequest {
            query: p.q.unwrap_or_default(),
            limit: p.limit,
            dst: p.dst,
            offset: p.offset,
        }
    }
}

pub fn router(system: AppState) -> Router {
    Router::new()
        .route("/search", get(search_get).post(search_post))
        .route("/health", get(health))
        .with_state(system)
}

async fn health() -> &'static str {
    "ok"
}

async fn search_get(
    State(system): State<AppState>,
    params: std::result::Result<Query<SearchParams>, QueryRejection>,
) -> std::result::Result<Json<SearchResults>, ApiError> {
    let Query(params) = params?;
    run_search(system, params.into()).await
}

async fn search_post(
    State(system): State<AppState>,
    body: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> std::result::Result<Json<SearchResults>, ApiError> {
    let Json(request) = body?;
    run_search(system, request).await
}

async fn run_search(
    system: AppState,
    request: SearchRequest,
) -> std::result::Result<Json<SearchResults>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(Error::EmptyQuery.into());
    }

    let results = tokio::task::spawn_blocking(move || system.search(&request))
        .await
        .map_err(|e| ApiError::internal(format!("search task failed: {e}")))??;

    info!(
        query = %results.query,
        hits = results.hit_count,
        "served search"
    );
    Ok(Json(results))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl+C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

/// Serve the API on `addr` until Ctrl+C.
pub async fn serve(addr: SocketAddr, system: Arc<TimeZoneSearchSystem>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "search server listening");

    axum::serve(listener, router(system))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Index the time zone catalog, then serve it on a multi-threaded runtime
/// until Ctrl+C.
pub fn run(addr: SocketAddr) -> Result<()> {
    let system = Arc::new(TimeZoneSearchSystem::init()?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(serve(addr, system))
}
