use axum::{Json, extract::State};

use super::ApiJson;
use crate::{
    AppState, accounts,
    error::{ApiError, ApiResult},
    models::{
        AccessTokenResponse, RefreshRequest, SignupRequest, SignupResponse, TokenRequest,
        TokenResponse,
    },
    validation,
};

/// signup
///
/// [Public Route] Registers a user and mails a confirmation code. Repeating the
/// call with the same username and email re-sends a fresh code.
#[utoipa::path(
    post,
    path = "/api/v1/auth/signup/",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Code sent", body = SignupResponse),
        (status = 400, description = "Invalid or conflicting username/email")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SignupRequest>,
) -> ApiResult<Json<SignupResponse>> {
    let (username, email) = validation::signup(payload)?;
    let response = accounts::signup(&state.repo, &state.notifier, username, email).await?;
    Ok(Json(response))
}

/// obtain_token
///
/// [Public Route] Exchanges username + confirmation code for a token pair.
/// The code is consumed on success.
#[utoipa::path(
    post,
    path = "/api/v1/auth/token/",
    tag = "auth",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Missing field or wrong code"),
        (status = 404, description = "Unknown username")
    )
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<TokenRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let (username, code) = validation::token_request(payload)?;
    let response = accounts::obtain_token(&state.repo, &state.config, &username, &code).await?;
    Ok(Json(response))
}

/// refresh_token
///
/// [Public Route] Issues a new access token for a valid refresh token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/token/refresh/",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Access token issued", body = AccessTokenResponse),
        (status = 401, description = "Invalid or expired refresh token")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> ApiResult<Json<AccessTokenResponse>> {
    let refresh = payload
        .refresh
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::field("refresh", "This field is required."))?;
    let response = accounts::refresh_token(&state.repo, &state.config, &refresh).await?;
    Ok(Json(response))
}
