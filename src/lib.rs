use axum::{Router, extract::FromRef, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain rules: accounts/tokens, authorization, payload validation.
pub mod accounts;
pub mod auth;
pub mod permissions;
pub mod validation;

// Data and persistence.
pub mod models;
pub mod pagination;
pub mod repository;

// Infrastructure.
pub mod config;
pub mod error;
pub mod notifier;

// HTTP surface.
pub mod handlers;
pub mod routes;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use notifier::{LogNotifier, MockNotifier, NotifierState, SmtpNotifier};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Auto-generated OpenAPI document, served at `/api-docs/openapi.json` and
/// browsable through Swagger UI at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::signup, handlers::auth::obtain_token, handlers::auth::refresh_token,
        handlers::users::get_me, handlers::users::update_me, handlers::users::list_users,
        handlers::users::create_user, handlers::users::get_user, handlers::users::update_user,
        handlers::users::delete_user,
        handlers::catalog::list_categories, handlers::catalog::create_category,
        handlers::catalog::get_category, handlers::catalog::delete_category,
        handlers::catalog::list_genres, handlers::catalog::create_genre,
        handlers::catalog::get_genre, handlers::catalog::delete_genre,
        handlers::titles::list_titles, handlers::titles::create_title, handlers::titles::get_title,
        handlers::titles::update_title, handlers::titles::delete_title,
        handlers::reviews::list_reviews, handlers::reviews::create_review,
        handlers::reviews::get_review, handlers::reviews::update_review,
        handlers::reviews::delete_review,
        handlers::comments::list_comments, handlers::comments::create_comment,
        handlers::comments::get_comment, handlers::comments::update_comment,
        handlers::comments::delete_comment,
    ),
    components(
        schemas(
            models::Role, models::UserProfile, models::Taxon, models::Title, models::Review,
            models::Comment, models::SignupRequest, models::SignupResponse, models::TokenRequest,
            models::TokenResponse, models::RefreshRequest, models::AccessTokenResponse,
            models::CreateUserRequest, models::UpdateUserRequest, models::CreateTaxonRequest,
            models::CreateTitleRequest, models::UpdateTitleRequest, models::CreateReviewRequest,
            models::UpdateReviewRequest, models::CommentRequest,
        )
    ),
    tags(
        (name = "auth", description = "Signup and token exchange"),
        (name = "users", description = "Account management"),
        (name = "catalog", description = "Categories and genres"),
        (name = "titles", description = "Reviewable works"),
        (name = "reviews", description = "Scored reviews of a title"),
        (name = "comments", description = "Replies to a review")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single, cloneable container of everything a handler may need. Each
/// field is cheap to clone (`Arc`s and a small config struct).
#[derive(Clone)]
pub struct AppState {
    /// Persistence: PostgreSQL in production, in-memory for tests and demos.
    pub repo: RepositoryState,
    /// Out-of-band delivery of confirmation codes.
    pub notifier: NotifierState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors such as `AuthUser` pull single components out of the state.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for NotifierState {
    fn from_ref(app_state: &AppState) -> NotifierState {
        app_state.notifier.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the full application: the versioned API under `/api/v1`, the
/// health probe, Swagger UI, a JSON 404 fallback, and the observability stack.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(routes::service_routes())
        .nest("/api/v1", routes::api_routes())
        .fallback(handlers::not_found)
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: one span per request, tagged with the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the `TraceLayer` span so every log line of a request carries its
/// method, URI and `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
