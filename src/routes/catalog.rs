use axum::{
    Router,
    routing::get,
};

use crate::{
    AppState,
    handlers::{self, catalog, titles},
};

/// Catalog Router Module
///
/// Public reads, admin-only writes. Categories and genres have no update
/// endpoint: their slug is their identity.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        // --- Categories ---
        .route(
            "/categories/",
            get(catalog::list_categories).post(catalog::create_category),
        )
        .route(
            "/categories/{slug}/",
            get(catalog::get_category).delete(catalog::delete_category),
        )
        // --- Genres ---
        .route(
            "/genres/",
            get(catalog::list_genres).post(catalog::create_genre),
        )
        .route(
            "/genres/{slug}/",
            get(catalog::get_genre).delete(catalog::delete_genre),
        )
        // --- Titles ---
        // GET /titles/?category=&genre=&year=&name=
        .route("/titles/", get(titles::list_titles).post(titles::create_title))
        .route(
            "/titles/{title_id}/",
            get(titles::get_title)
                .patch(titles::update_title)
                .delete(titles::delete_title),
        )
        .method_not_allowed_fallback(handlers::method_not_allowed)
}
