//! Route definitions and router construction.
//!
//! Axum 0.8 uses brace syntax for path parameters: `{name}`.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bootstrap::CorsConfig;
use crate::handlers;
use crate::state::AppState;

fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    match config {
        CorsConfig::AllowAll => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsConfig::AllowOrigins(origins) => {
            use axum::http::HeaderValue;
            let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

/// All API routes without the `/api` prefix.
pub(crate) fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::status))
        // Agents
        .route("/agents", get(handlers::agents::list))
        .route("/agents/{name}/start", post(handlers::agents::start))
        .route("/agents/{name}/stop", post(handlers::agents::stop))
        // Singleton servers
        .route("/servers", get(handlers::servers::list))
        .route("/servers/{name}", get(handlers::servers::status))
        .route("/servers/{name}/start", post(handlers::servers::start))
        .route("/servers/{name}/stop", post(handlers::servers::stop))
        // Streams (SSE)
        .route("/activity/stream", get(handlers::activity::stream))
        .route("/templates/stream", get(handlers::templates::stream))
        .route("/processes/stream", get(handlers::processes::stream))
}

/// Create the main router: `/health` plus the API nested under `/api`.
pub fn create_router(state: AppState, cors_config: &CorsConfig) -> Router {
    let cors = build_cors_layer(cors_config);

    Router::new()
        .route("/health", get(handlers::health::check))
        .nest("/api", api_routes().with_state(state).layer(cors))
        .layer(TraceLayer::new_for_http())
}
