//! HTTP route handlers for the importer.
//!
//! The JSON API lives under `/api`; any other path is served from the
//! public directory when one is configured and present.

pub mod rules;
pub mod status;

use std::path::Path;

use axum::Router;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::AppState;

/// Create the main Axum router with all routes.
pub fn create_router(state: AppState, public_dir: Option<&Path>) -> Router {
    let router = Router::new().nest("/api", api_routes()).with_state(state);

    let router = match public_dir {
        Some(dir) if dir.is_dir() => {
            info!("Serving static files from {}", dir.display());
            router.fallback_service(ServeDir::new(dir))
        }
        Some(dir) => {
            warn!("Public directory {} not found, static files disabled", dir.display());
            router
        }
        None => router,
    };

    router.layer(TraceLayer::new_for_http())
}

/// Create `/api` routes.
fn api_routes() -> Router<AppState> {
    Router::new()
        // Rule list
        .merge(rules::routes())
        // Connection status and counters
        .merge(status::routes())
}
