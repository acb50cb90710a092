/// Router Module Index
///
/// Groups the `/api/v1` endpoints by resource. Access control is not a property
/// of the router here: every handler asks `permissions::check` with its own
/// action and resource, so anonymous and authenticated requests share routes.
///
/// Each sub-router answers unsupported verbs on its paths with a JSON 405.

/// `/auth/*` and `/users/*`.
pub mod accounts;

/// `/categories/*`, `/genres/*` and `/titles/*`.
pub mod catalog;

/// Reviews and comments nested under `/titles/{title_id}/`.
pub mod content;

use axum::{Router, routing::get};

use crate::AppState;

/// api_routes
///
/// The versioned API surface, to be nested under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(accounts::account_routes())
        .merge(catalog::catalog_routes())
        .merge(content::content_routes())
}

/// Unversioned operational endpoints.
pub fn service_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers and container orchestration.
        .route("/health", get(|| async { "ok" }))
}
