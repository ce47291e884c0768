//! HTTP surface of the review parser.
//!
//! ```text
//! POST /parse-review   parse a review (also served at `/`)
//! GET  /health         liveness check
//! ```
//!
//! Every response carries permissive CORS headers so the function can be
//! called straight from a browser client.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{
        HeaderMap, HeaderName, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, instrument};

use crate::{
    base::{
        error::ApiError,
        types::{ParseReviewRequest, ParsedReview, Void},
    },
    interaction::parse_review::handle_parse_review,
    runtime::Runtime,
};

/// Header carrying the caller's project API key.
const APIKEY: HeaderName = HeaderName::from_static("apikey");
/// Header sent by the Supabase client libraries.
const X_CLIENT_INFO: HeaderName = HeaderName::from_static("x-client-info");

/// Build the application router.
pub fn router(runtime: Runtime) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, X_CLIENT_INFO, APIKEY, CONTENT_TYPE]);

    Router::new()
        .route("/", post(parse_review))
        .route("/parse-review", post(parse_review))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(runtime)
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn serve(runtime: Runtime) -> Void {
    let listener = TcpListener::bind(&runtime.config.listen_address).await?;

    info!("Listening on {} ...", listener.local_addr()?);

    axum::serve(listener, router(runtime)).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down ...");
    }
}

// Handlers.

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// POST /parse-review
///
/// The caller is authenticated before the body is read.
#[instrument(skip_all)]
async fn parse_review(State(runtime): State<Runtime>, headers: HeaderMap, body: Bytes) -> Result<Json<ParsedReview>, ApiError> {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let api_key = headers.get(APIKEY).and_then(|v| v.to_str().ok());

    let (session, _user) = runtime.auth.authenticate(authorization, api_key).await?;

    let request: ParseReviewRequest = serde_json::from_slice(&body).map_err(|e| ApiError::InvalidBody(e.to_string()))?;
    let stored = handle_parse_review(&runtime, &session, request).await?;

    Ok(Json(stored))
}
