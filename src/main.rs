mod analysis;
mod catalog;
mod http;
mod idempotency;
mod mercado;
mod metrics;
mod models;
mod service;
mod store;

use analysis::{CostConfig, Listing, RandomizedEstimator};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use catalog::CatalogFetcher;
use mercado::MercadoClient;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{Analysis, AnalysisPatch, ApiError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use service::{AnalysisService, ServiceError, ServiceErrorKind};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use store::SupabaseStore;
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

type Service = AnalysisService<MercadoClient, SupabaseStore, SupabaseStore>;
type Catalog = CatalogFetcher<MercadoClient>;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "margem.api", "server crashed: {err}");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let marketplace = MercadoClient::from_env();
    let service = AnalysisService::new(
        marketplace.clone(),
        SupabaseStore::from_env(),
        SupabaseStore::from_env(),
        Box::new(RandomizedEstimator),
    );
    let catalog = CatalogFetcher::new(marketplace);

    let openapi_raw = include_str!("../docs/openapi.yaml");
    let openapi: serde_json::Value =
        serde_yaml::from_str(openapi_raw).unwrap_or(serde_json::json!({"openapi":"3.0.3"}));
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prom recorder");
    let redis = std::env::var("REDIS_URL")
        .ok()
        .and_then(|u| redis::Client::open(u).ok());

    let state = AppState {
        service: Arc::new(service),
        catalog: Arc::new(catalog),
        openapi: Arc::new(openapi),
        idempotency: Arc::new(Mutex::new(HashMap::new())),
        prometheus_handle,
        redis,
    };

    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .route("/analyses", post(create_analysis).get(list_analyses))
        .route(
            "/analyses/{id}",
            patch(update_analysis).delete(delete_analysis),
        )
        .route("/catalog/popular", get(catalog_popular))
        .route("/settings", get(get_settings).put(put_settings))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "margem.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    service: Arc<Service>,
    catalog: Arc<Catalog>,
    openapi: Arc<serde_json::Value>,
    idempotency: Arc<Mutex<HashMap<String, Analysis>>>,
    prometheus_handle: PrometheusHandle,
    redis: Option<redis::Client>,
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
///
/// Returns a small JSON payload with `status` and `service`.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "margem-api-rs",
    }))
}

async fn openapi_json(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json((*state.openapi).clone())
}

async fn swagger_ui() -> axum::http::Response<String> {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Margem API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    axum::http::Response::builder()
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.to_string())
        .unwrap()
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> axum::http::Response<String> {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return axum::http::Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .body("unauthorized".into())
                .unwrap();
        }
    }
    let body = state.prometheus_handle.render();
    axum::http::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .unwrap()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest {
    listing_id: String,
}

/// Run the full listing analysis and persist the result.
///
/// - Method: `POST`
/// - Path: `/analyses`
/// - Body: `AnalyzeRequest`
/// - Response: `Analysis` (may carry a `warning` when persistence failed)
///
/// Honours an optional `Idempotency-Key` header: a repeated key replays
/// the stored response instead of re-running the analysis.
async fn create_analysis(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<Analysis>, AppError> {
    metrics::inc_requests("/analyses");
    info!(
        target = "margem.api",
        listing_id = %payload.listing_id,
        "analysis requested",
    );

    if let Some(key) = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    {
        if let Some(client) = &state.redis {
            if let Some(existing) = idempotency::redis_get(client, &key).await {
                return Ok(Json(existing));
            }
            let analysis = state.service.analyze(&payload.listing_id).await?;
            let ttl = std::env::var("IDEMPOTENCY_TTL_SECS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(3600);
            idempotency::redis_set(client, &key, &analysis, ttl).await;
            return Ok(Json(analysis));
        }
        if let Some(existing) = state.idempotency.lock().await.get(&key).cloned() {
            return Ok(Json(existing));
        }
        let analysis = state.service.analyze(&payload.listing_id).await?;
        state.idempotency.lock().await.insert(key, analysis.clone());
        return Ok(Json(analysis));
    }

    let analysis = state.service.analyze(&payload.listing_id).await?;
    Ok(Json(analysis))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<u32>,
    search: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    analyses: Vec<Analysis>,
}

async fn list_analyses(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    metrics::inc_requests("/analyses:list");
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let analyses = state
        .service
        .list_analyses(limit, query.search.as_deref())
        .await?;
    Ok(Json(ListResponse { analyses }))
}

async fn update_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<AnalysisPatch>,
) -> Result<Json<serde_json::Value>, AppError> {
    metrics::inc_requests("/analyses:update");
    state.service.update_analysis(&id, &patch).await?;
    Ok(Json(json!({"success": true})))
}

async fn delete_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    metrics::inc_requests("/analyses:delete");
    state.service.delete_analysis(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogResponse {
    listings: Vec<Listing>,
    is_demo: bool,
    total: usize,
    source: &'static str,
}

/// Popular listings across the configured probe pool.
///
/// - Method: `GET`
/// - Path: `/catalog/popular`
///
/// Never returns an empty collection: with no live data the response is
/// the demo dataset and `source` says so.
async fn catalog_popular(State(state): State<AppState>) -> Json<CatalogResponse> {
    metrics::inc_requests("/catalog/popular");
    let page = state.catalog.fetch_popular().await;
    let source = if page.is_demo { "demo" } else { "mercado_livre" };
    Json(CatalogResponse {
        total: page.listings.len(),
        is_demo: page.is_demo,
        source,
        listings: page.listings,
    })
}

async fn get_settings(State(state): State<AppState>) -> Json<CostConfig> {
    metrics::inc_requests("/settings:get");
    Json(state.service.effective_cost_config().await)
}

async fn put_settings(
    State(state): State<AppState>,
    Json(config): Json<CostConfig>,
) -> Result<Json<serde_json::Value>, AppError> {
    metrics::inc_requests("/settings:put");
    state.service.save_cost_config(&config).await?;
    Ok(Json(json!({"success": true})))
}

#[derive(Debug)]
enum AppError {
    Service(ServiceError),
}

impl From<ServiceError> for AppError {
    fn from(value: ServiceError) -> Self {
        Self::Service(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Service(err) => {
                let status = match err.kind() {
                    ServiceErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    ServiceErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ServiceErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let payload = ApiError {
                    error: err.stage().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
