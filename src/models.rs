use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Accounts ---

/// Role
///
/// The RBAC field of a user. Serialized in lowercase (`"user"`, `"moderator"`, `"admin"`)
/// both on the wire and in the `users.role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

#[derive(Debug, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(value)),
        }
    }
}

/// User
///
/// The canonical account record from the `users` table. Never serialized directly:
/// it carries the confirmation code, so responses go through [`UserProfile`].
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    // Superusers are treated as admins regardless of `role`.
    pub is_superuser: bool,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    // Present only between signup and a successful token exchange.
    pub confirmation_code: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.is_superuser || self.role == Role::Admin
    }
}

/// UserProfile
///
/// Public representation of an account (`/users/...` endpoints).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: Role,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            role: user.role,
        }
    }
}

// --- Catalog ---

/// Taxon
///
/// A category or a genre: both are a `(name, slug)` pair addressed by slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Taxon {
    #[serde(skip)]
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// Title
///
/// A reviewable work. `rating` is the rounded mean of its review scores,
/// computed on every read; `None` while the title has no reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Title {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub rating: Option<i32>,
    pub description: String,
    pub genre: Vec<Taxon>,
    pub category: Option<Taxon>,
}

/// Review
///
/// A user's scored opinion of a title. At most one per (author, title).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Review {
    pub id: i64,
    #[serde(skip)]
    pub title_id: i64,
    #[serde(skip)]
    pub author_id: i64,
    // Username of the author, resolved by a join.
    pub author: String,
    pub text: String,
    pub score: i32,
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
}

/// Comment
///
/// A reply attached to a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    #[serde(skip)]
    pub review_id: i64,
    #[serde(skip)]
    pub author_id: i64,
    pub author: String,
    pub text: String,
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---
//
// Required fields are still `Option` so a missing field is reported as a field
// error by validation rather than as a deserialization failure.

/// SignupRequest
///
/// Input for `POST /auth/signup/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignupRequest {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// SignupResponse
///
/// Echo of the registered pair; the confirmation code travels by email only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignupResponse {
    pub username: String,
    pub email: String,
}

/// TokenRequest
///
/// Input for `POST /auth/token/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenRequest {
    pub username: Option<String>,
    pub confirmation_code: Option<String>,
}

/// TokenResponse
///
/// A bearer access token plus the refresh token that can renew it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
    pub refresh: String,
}

/// RefreshRequest
///
/// Input for `POST /auth/token/refresh/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RefreshRequest {
    pub refresh: Option<String>,
}

/// AccessTokenResponse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccessTokenResponse {
    pub token: String,
}

/// CreateUserRequest
///
/// Admin-side account creation (`POST /users/`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
}

/// UpdateUserRequest
///
/// Partial update of an account. On `/users/me/` the `role` field is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// CreateTaxonRequest
///
/// Input for `POST /categories/` and `POST /genres/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateTaxonRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
}

/// CreateTitleRequest
///
/// Genres and category are referenced by slug.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateTitleRequest {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Vec<String>,
    pub category: Option<String>,
}

/// UpdateTitleRequest
///
/// Partial update of a title. `"category": null` detaches the category,
/// while an absent `category` key leaves it unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateTitleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[ts(optional)]
    pub category: Option<Option<String>>,
}

/// CreateReviewRequest
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateReviewRequest {
    pub text: Option<String>,
    pub score: Option<i64>,
}

/// UpdateReviewRequest
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateReviewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
}

/// CommentRequest
///
/// Used for both creating and editing a comment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentRequest {
    pub text: Option<String>,
}

/// Maps a present JSON key to `Some`, so `null` becomes `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
