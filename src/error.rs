use std::collections::BTreeMap;

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::repository::{Duplicate, RepoError};

pub type ApiResult<T> = Result<T, ApiError>;

/// Field name used for errors that are not tied to a single input field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// FieldErrors
///
/// Accumulates per-field validation messages so a payload can report every
/// problem at once instead of failing on the first one.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Converts the accumulator into a result: `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> ApiResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

/// ApiError
///
/// Request-scoped failure taxonomy. Every variant maps to exactly one HTTP status
/// and renders as `{"error": {"status", "message", "fields"?}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input.")]
    Validation(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication credentials were not provided or are invalid.")]
    AuthenticationRequired,

    #[error("You do not have permission to perform this action.")]
    PermissionDenied,

    #[error("{0}")]
    NotFound(String),

    #[error("Method not allowed.")]
    MethodNotAllowed,

    #[error("Internal server error.")]
    Internal,
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found."))
    }

    /// Shorthand for a validation failure on a single field.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut error = json!({
            "status": status.as_u16(),
            "message": self.to_string(),
        });
        if let ApiError::Validation(fields) = &self {
            error["fields"] = json!(fields);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => ApiError::not_found(what),
            RepoError::Duplicate(duplicate) => {
                let field = match duplicate {
                    Duplicate::Username => "username",
                    Duplicate::Email => "email",
                    Duplicate::Slug => "slug",
                    Duplicate::Review => NON_FIELD_ERRORS,
                };
                ApiError::field(field, duplicate.to_string())
            }
            RepoError::UnknownReference { field, value } => {
                ApiError::field(field, format!("Object with slug={value} does not exist."))
            }
            RepoError::Database(e) => {
                tracing::error!(error = ?e, "database operation failed");
                ApiError::Internal
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// An id segment that does not parse cannot name an existing object.
impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "unmatched path parameter");
        ApiError::NotFound("Not found.".to_string())
    }
}
