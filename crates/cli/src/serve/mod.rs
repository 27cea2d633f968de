//! `pygmalion serve` -- HTTP server for the survey.
//!
//! Serves the participant pages and a small JSON API over the same flow
//! registry, using `axum` + `tokio`.
//!
//! Endpoints:
//! - GET  /health                    - Server status
//! - GET  /                          - Start page (session input)
//! - GET  /play                      - Start a multi-scenario run, redirect to it
//! - GET  /play/{scenario_id}        - Start a single-scenario flow, redirect to it
//! - GET  /flows/{id}                - Render a flow
//! - POST /flows/{id}                - Form submit of a rating
//! - GET  /api/scenarios             - Catalog listing
//! - POST /api/flows                 - Start a flow
//! - GET  /api/flows/{id}            - Flow state
//! - PUT  /api/flows/{id}/rating     - Move or clear the slider
//! - POST /api/flows/{id}/submit     - Submit the current rating
//! - GET  /images/*                  - Static scenario images (with `--assets`)
//!
//! Every response passes per-IP rate limiting (except `/health`) and CORS.

mod handlers;
mod middleware;
mod pages;
mod registry;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{middleware as axum_middleware, Json, Router};
use pygmalion_core::{Catalog, ConditionAssigner};
use pygmalion_flow::FlowError;
use pygmalion_storage::ResponseSink;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use self::handlers::{
    handle_get_flow, handle_health, handle_list_scenarios, handle_not_found, handle_set_rating,
    handle_start_flow, handle_submit,
};
use self::middleware::rate_limit_middleware;
use self::pages::{
    handle_flow_form, handle_flow_page, handle_play, handle_play_scenario, handle_start_page,
};
use self::registry::FlowRegistry;
use self::state::{AppState, RateLimiter};

/// Maximum request body size: 64 KB. Ratings are tiny.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Everything `start_server` needs, resolved by the command line layer.
pub struct ServeOptions {
    pub port: u16,
    pub catalog: Catalog,
    pub sink: Arc<dyn ResponseSink>,
    pub assigner: Arc<dyn ConditionAssigner>,
    pub rate_limit: u64,
    pub flow_ttl: Duration,
    pub assets: Option<PathBuf>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// HTTP status for input a flow refused.
fn flow_error_status(error: &FlowError) -> StatusCode {
    match error {
        FlowError::RatingOutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        FlowError::Busy | FlowError::Finished | FlowError::RetryOnly | FlowError::NotSubmitting => {
            StatusCode::CONFLICT
        }
    }
}

fn flow_error_response(error: &FlowError) -> Response {
    json_error(flow_error_status(error), &error.to_string()).into_response()
}

/// Build the application router around `state`.
fn router(state: Arc<AppState>, assets: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(handle_health))
        .route("/", get(handle_start_page))
        .route("/play", get(handle_play))
        .route("/play/{scenario_id}", get(handle_play_scenario))
        .route("/flows/{id}", get(handle_flow_page).post(handle_flow_form))
        .route("/api/scenarios", get(handle_list_scenarios))
        .route("/api/flows", post(handle_start_flow))
        .route("/api/flows/{id}", get(handle_get_flow))
        .route("/api/flows/{id}/rating", put(handle_set_rating))
        .route("/api/flows/{id}/submit", post(handle_submit));

    if let Some(dir) = assets {
        app = app.nest_service("/images", ServeDir::new(dir));
    }

    app.fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl+C.
///
/// When TLS cert/key paths are provided, the server listens over HTTPS
/// using `axum-server` with rustls (requires the `tls` feature). Otherwise
/// it uses plain HTTP.
pub async fn start_server(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let ServeOptions {
        port,
        catalog,
        sink,
        assigner,
        rate_limit,
        flow_ttl,
        assets,
        tls_cert,
        tls_key,
    } = options;

    tracing::info!(
        sink = sink.sink_id(),
        scenarios = catalog.len(),
        rate_limit,
        flow_ttl_secs = flow_ttl.as_secs(),
        "starting survey server"
    );
    if let Some(dir) = &assets {
        tracing::info!(dir = %dir.display(), "serving scenario images");
    }

    let state = Arc::new(AppState {
        catalog,
        sink,
        assigner,
        flows: FlowRegistry::new(flow_ttl),
        rate_limiter: RateLimiter::new(rate_limit),
    });
    let app = router(state, assets);

    let addr = format!("0.0.0.0:{}", port);

    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&tls_cert, &tls_key) {
        let config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        tracing::info!("listening on https://{}", socket_addr);
        axum_server::bind_rustls(socket_addr, config)
            .serve(app.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await?;
        return Ok(());
    }

    #[cfg(not(feature = "tls"))]
    if tls_cert.is_some() || tls_key.is_some() {
        return Err("TLS requires building with the `tls` feature".into());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_errors_map_to_statuses() {
        assert_eq!(
            flow_error_status(&FlowError::RatingOutOfRange {
                rating: 0,
                min: 1,
                max: 6
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(flow_error_status(&FlowError::Busy), StatusCode::CONFLICT);
        assert_eq!(flow_error_status(&FlowError::Finished), StatusCode::CONFLICT);
        assert_eq!(flow_error_status(&FlowError::RetryOnly), StatusCode::CONFLICT);
    }
}
