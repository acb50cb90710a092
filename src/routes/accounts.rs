use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    AppState,
    handlers::{self, auth, users},
};

/// Accounts Router Module
///
/// Signup and token exchange (open to anyone) plus account management.
/// `/users/me/` is matched before `/users/{username}/`, which is why `me` is a
/// reserved username.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        // POST /auth/signup/
        // Creates the account if needed and mails a confirmation code.
        .route("/auth/signup/", post(auth::signup))
        // POST /auth/token/
        // Confirmation code -> access + refresh token.
        .route("/auth/token/", post(auth::obtain_token))
        // POST /auth/token/refresh/
        .route("/auth/token/refresh/", post(auth::refresh_token))
        // GET/PATCH /users/me/
        .route("/users/me/", get(users::get_me).patch(users::update_me))
        // GET/POST /users/  (admin)
        .route("/users/", get(users::list_users).post(users::create_user))
        // GET/PATCH/DELETE /users/{username}/  (admin)
        .route(
            "/users/{username}/",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .method_not_allowed_fallback(handlers::method_not_allowed)
}
