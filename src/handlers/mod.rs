use axum::extract::{FromRequest, FromRequestParts};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::ApiError;

pub mod auth;
pub mod catalog;
pub mod comments;
pub mod reviews;
pub mod titles;
pub mod users;

// --- Extractors ---

/// ApiJson
///
/// `axum::Json` with its rejection (malformed body, wrong content type) rendered
/// in the API's error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// ApiPath
///
/// `axum::extract::Path` whose rejection is a 404: a segment that is not a valid
/// id cannot name an existing object.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// ApiQuery
///
/// `axum::extract::Query` with a 400 in the API's error envelope on bad parameters.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

// --- Shared query parameters ---

/// SearchParams
///
/// `?search=` on the listings that support it (case-insensitive substring match).
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SearchParams {
    pub search: Option<String>,
}

impl SearchParams {
    pub fn term(&self) -> Option<&str> {
        self.search.as_deref().filter(|term| !term.is_empty())
    }
}

// --- Fallbacks ---

/// method_not_allowed
///
/// Answers verbs a route does not serve (PUT everywhere, DELETE on `/users/me/`,
/// PATCH on categories and genres).
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// not_found
///
/// Answers paths no route matches.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not found.".to_string())
}
