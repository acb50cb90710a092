use axum::{Router, routing::get};

use crate::{
    AppState,
    handlers::{self, comments, reviews},
};

/// Content Router Module
///
/// User-generated reviews and comments. Reads are public; writes need a token,
/// and edits need authorship or a moderator/admin role. Parents are resolved
/// first, so an unknown title or a review under the wrong title is a 404.
pub fn content_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/titles/{title_id}/reviews/",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/",
            get(reviews::get_review)
                .patch(reviews::update_review)
                .delete(reviews::delete_review),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}/",
            get(comments::get_comment)
                .patch(comments::update_comment)
                .delete(comments::delete_comment),
        )
        .method_not_allowed_fallback(handlers::method_not_allowed)
}
