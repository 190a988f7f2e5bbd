//! HTTP service exposing analysis and optimization to the browser extension.
//!
//! The extension scrapes marketplace pages, POSTs the raw listings here and
//! renders the JSON that comes back. Validation failures answer 400 with an
//! `{"error": ...}` body the extension displays verbatim.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::analysis::{self, AnalysisResult};
use crate::currency::CurrencyConverter;
use crate::error::{AnalyzerError, Result};
use crate::fetcher::ListingFetcher;
use crate::models::{PricedListing, RawListing};
use crate::optimizer::{self, OptimizationResult};

/// Origins the browser extension runs on
const ALLOWED_ORIGINS: &[&str] = &["https://www.discogs.com", "https://discogs.com"];

/// Scraped listing payloads for large wantlists get big; cap bodies at 2 MiB.
const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub converter: Arc<CurrencyConverter>,
    pub fetcher: Arc<ListingFetcher>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest {
    #[serde(default)]
    #[allow(dead_code)]
    token: Option<String>,
    #[serde(default)]
    listings: Vec<RawListing>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeRequest {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    listings: Vec<RawListing>,
    #[serde(default)]
    budget: Option<f64>,
    #[serde(default)]
    ignored_releases: Vec<String>,
}

type ErrorResponse = (StatusCode, Json<Value>);

/// Map an analyzer error onto the wire: validation failures become 400 with
/// the message, anything else is an opaque 500.
fn error_response(err: &AnalyzerError) -> ErrorResponse {
    match err {
        AnalyzerError::InvalidRequest(message) => {
            log::debug!("Rejecting request: {}", message);
            (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
        }
        other => {
            log::error!("Request failed: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal_error" })),
            )
        }
    }
}

/// GET /health
async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /analyze - rank sellers over the scraped listings
async fn analyze_handler(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> std::result::Result<Json<AnalysisResult>, ErrorResponse> {
    if req.listings.is_empty() {
        return Err(error_response(&AnalyzerError::InvalidRequest(
            "listings required".to_string(),
        )));
    }

    let priced = price_scraped(&state.converter, &req.listings).await;
    Ok(Json(analysis::aggregate(&priced)))
}

/// POST /optimize-fast - optimize over the scraped text fields only
async fn optimize_fast_handler(
    State(state): State<AppState>,
    Json(req): Json<OptimizeRequest>,
) -> std::result::Result<Json<OptimizationResult>, ErrorResponse> {
    let budget = validate_optimize(&req).map_err(|e| error_response(&e))?;

    let priced = price_scraped(&state.converter, &req.listings).await;
    let priced = deal_candidates(priced);

    Ok(Json(optimizer::optimize(&priced, budget, &req.ignored_releases)))
}

/// POST /optimize - enrich through the listing-detail service, then optimize
async fn optimize_handler(
    State(state): State<AppState>,
    Json(req): Json<OptimizeRequest>,
) -> std::result::Result<Json<OptimizationResult>, ErrorResponse> {
    let budget = validate_optimize(&req).map_err(|e| error_response(&e))?;
    let token = req.token.as_deref().map(str::trim).unwrap_or("");
    if token.is_empty() {
        return Err(error_response(&AnalyzerError::InvalidRequest(
            "token required".to_string(),
        )));
    }

    let records = state.fetcher.fetch_all(&req.listings, token).await;
    let mut priced = Vec::with_capacity(records.len());
    for record in &records {
        priced.push(state.converter.price_record(record).await);
    }
    let priced = deal_candidates(priced);

    Ok(Json(optimizer::optimize(&priced, budget, &req.ignored_releases)))
}

fn validate_optimize(req: &OptimizeRequest) -> Result<f64> {
    if req.listings.is_empty() {
        return Err(AnalyzerError::InvalidRequest(
            "listings required".to_string(),
        ));
    }
    match req.budget {
        Some(budget) if budget > 0.0 => Ok(budget),
        _ => Err(AnalyzerError::InvalidRequest(
            "valid budget required".to_string(),
        )),
    }
}

async fn price_scraped(
    converter: &CurrencyConverter,
    listings: &[RawListing],
) -> Vec<PricedListing> {
    let mut priced = Vec::with_capacity(listings.len());
    for listing in listings {
        priced.push(converter.price_raw(listing).await);
    }
    priced
}

/// Zero-price entries are not meaningful deals and corrupt efficiency
/// scoring, so they never reach the optimizer.
fn deal_candidates(priced: Vec<PricedListing>) -> Vec<PricedListing> {
    priced.into_iter().filter(|it| it.price_usd() > 0.0).collect()
}

/// Build the service router
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = ALLOWED_ORIGINS
        .iter()
        .map(|origin| HeaderValue::from_static(origin))
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health_handler))
        .route("/analyze", post(analyze_handler))
        .route("/optimize-fast", post(optimize_fast_handler))
        .route("/optimize", post(optimize_handler))
        .layer(cors)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state)
}

/// Start the server (async). Binds all interfaces so the extension can
/// reach a tunneled or containerized instance.
pub async fn serve(state: AppState, port: u16) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", port);

    log::info!("Analysis server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
