//! REST API server module
//!
//! Exposes the unlock job lifecycle over HTTP:
//!
//! - `GET /api/health` - Health check
//! - `GET /api/openapi.json` - OpenAPI specification
//! - `POST /api/unlock-pdf/start` - Begin an unlock job (multipart upload)
//! - `GET /api/unlock-pdf/result/:job_id` - Poll; streams the PDF when done
//! - `POST /api/unlock-pdf/cancel/:job_id` - Cancel a running job
//!
//! The unlock routes enforce same-origin requests and a per-client rate
//! limit; every response carries the standard security headers.

use crate::config::Config;
use crate::error::{ApiError, Error, Result};
use crate::runner::UnlockRunner;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
pub fn create_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.unlock.max_upload_bytes;

    // Origin and upload-size checks apply only to the unlock job routes;
    // health and docs stay reachable from anywhere.
    let unlock_routes = Router::new()
        .route("/unlock-pdf/start", post(routes::start_unlock))
        .route("/unlock-pdf/result/:job_id", get(routes::unlock_result))
        .route("/unlock-pdf/cancel/:job_id", post(routes::cancel_unlock))
        .layer(middleware::from_fn(enforce_same_origin))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    let api = Router::new()
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .merge(unlock_routes);

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::HeaderName::from_static("cross-origin-resource-policy"),
            HeaderValue::from_static("same-origin"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Reject cross-origin requests to the unlock routes.
///
/// A request with no `Origin` header (curl, same-origin fetches in some
/// browsers) is exempt; a present header must parse and its authority must
/// equal the request `Host`.
async fn enforce_same_origin(req: Request, next: Next) -> Response {
    let Some(origin) = req.headers().get(header::ORIGIN) else {
        return next.run(req).await;
    };

    let Some(origin_host) = origin.to_str().ok().and_then(origin_authority) else {
        return (
            StatusCode::FORBIDDEN,
            Json(ApiError::forbidden("Invalid request origin.")),
        )
            .into_response();
    };

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if origin_host != host {
        tracing::debug!(origin = origin_host, host, "cross-origin request rejected");
        return (
            StatusCode::FORBIDDEN,
            Json(ApiError::forbidden("Origin not allowed.")),
        )
            .into_response();
    }

    next.run(req).await
}

/// Authority (`host[:port]`) of an http(s) origin, if well-formed
fn origin_authority(origin: &str) -> Option<&str> {
    let rest = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))?;
    let authority = rest.split('/').next().unwrap_or("");
    (!authority.is_empty()).then_some(authority)
}

/// Start the API server on the configured bind address.
///
/// Spawns the periodic job reaper, binds a TCP listener, and serves the
/// router until the server stops. Completes with an error if the listener
/// cannot bind or the server fails.
pub async fn start_api_server(config: Arc<Config>, runner: Arc<dyn UnlockRunner>) -> Result<()> {
    config.validate()?;

    let state = AppState::new(config.clone(), runner);

    let shutdown = CancellationToken::new();
    let reaper = state
        .store
        .spawn_reaper(config.unlock.reap_interval, shutdown.clone());

    let bind_address = config.server.bind_address;
    let app = create_router(state);

    let listener = TcpListener::bind(bind_address).await.map_err(Error::Io)?;
    tracing::info!(address = %bind_address, "unlock API listening");

    // ConnectInfo supplies the peer address used as the rate-limit key
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| Error::ApiServer(e.to_string()));

    shutdown.cancel();
    let _ = reaper.await;

    tracing::info!("unlock API stopped");
    served
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
