use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    error::ApiError,
    models::{Role, User},
    repository::RepositoryState,
};

/// TokenKind
///
/// Distinguishes the short-lived bearer token from the one that can only renew it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims
///
/// Payload of every token this service signs (HS256).
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user id, as a decimal string.
    pub sub: String,
    /// Token type (typ): access tokens authenticate requests, refresh tokens renew them.
    pub typ: TokenKind,
    /// Expiration Time (exp).
    pub exp: i64,
    /// Issued At (iat).
    pub iat: i64,
}

/// issue_token
///
/// Signs a token of `kind` for `user_id`, valid for the lifetime configured for that kind.
pub fn issue_token(config: &AppConfig, user_id: i64, kind: TokenKind) -> Result<String, ApiError> {
    let ttl = match kind {
        TokenKind::Access => config.access_token_ttl,
        TokenKind::Refresh => config.refresh_token_ttl,
    };
    let now = Utc::now();
    let exp = now + Duration::seconds(ttl.min(u64::from(u32::MAX)) as i64);

    let claims = Claims {
        sub: user_id.to_string(),
        typ: kind,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(error = ?e, "failed to sign token");
        ApiError::Internal
    })
}

/// decode_token
///
/// Verifies signature, expiry and type of `token` and returns the user id it was issued for.
///
/// Any failure (malformed, tampered, expired, wrong `typ`) is reported as
/// `AuthenticationRequired`; the reason is only logged.
pub fn decode_token(config: &AppConfig, token: &str, expected: TokenKind) -> Result<i64, ApiError> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => tracing::debug!("token expired"),
            _ => tracing::debug!(error = ?e, "token rejected"),
        }
        ApiError::AuthenticationRequired
    })?;

    if token_data.claims.typ != expected {
        tracing::debug!(typ = ?token_data.claims.typ, "token of the wrong type");
        return Err(ApiError::AuthenticationRequired);
    }

    token_data
        .claims
        .sub
        .parse()
        .map_err(|_| ApiError::AuthenticationRequired)
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Role and superuser flag are
/// re-read from the repository on every request, so a role change applies to
/// tokens that were already issued.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub is_superuser: bool,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.is_superuser || self.role == Role::Admin
    }
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            is_superuser: user.is_superuser,
        }
    }
}

/// Pulls the bearer token out of the `Authorization` header, if there is one.
///
/// `Ok(None)` means no header at all; a header that is not a bearer token is an error.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, ApiError> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(Some)
        .ok_or(ApiError::AuthenticationRequired)
}

/// Resolves an access token to the current state of its user.
async fn resolve_user(
    repo: &RepositoryState,
    config: &AppConfig,
    token: &str,
) -> Result<AuthUser, ApiError> {
    let user_id = decode_token(config, token, TokenKind::Access)?;

    // A valid token for a deleted account no longer authenticates.
    repo.get_user(user_id)
        .await?
        .map(AuthUser::from)
        .ok_or(ApiError::AuthenticationRequired)
}

/// AuthUser Extractor Implementation
///
/// Usable as a handler argument wherever a route can never be served anonymously.
/// Rejects with 401 when the header is missing, the token is invalid, or the
/// user no longer exists.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let token = bearer_token(parts)?.ok_or(ApiError::AuthenticationRequired)?;
        resolve_user(&repo, &config, token).await
    }
}

/// Requester
///
/// Optional identity for routes that anonymous clients may also call. The
/// permission evaluator decides what an anonymous requester may do.
///
/// No `Authorization` header yields `Requester(None)`; a header carrying a bad
/// token is still rejected with 401 rather than silently downgraded.
#[derive(Debug, Clone)]
pub struct Requester(pub Option<AuthUser>);

impl Requester {
    pub fn user(&self) -> Option<&AuthUser> {
        self.0.as_ref()
    }

    pub fn is(&self, user_id: i64) -> bool {
        self.0.as_ref().is_some_and(|user| user.id == user_id)
    }
}

impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts)? else {
            return Ok(Requester(None));
        };
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        resolve_user(&repo, &config, token).await.map(|user| Requester(Some(user)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_round_trips_to_user_id() {
        let config = AppConfig::default();
        let token = issue_token(&config, 42, TokenKind::Access).unwrap();
        assert_eq!(decode_token(&config, &token, TokenKind::Access).unwrap(), 42);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let config = AppConfig::default();
        let refresh = issue_token(&config, 7, TokenKind::Refresh).unwrap();
        assert!(matches!(
            decode_token(&config, &refresh, TokenKind::Access),
            Err(ApiError::AuthenticationRequired)
        ));
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let config = AppConfig::default();
        let other = AppConfig {
            jwt_secret: "a-completely-different-secret".to_string(),
            ..AppConfig::default()
        };
        let token = issue_token(&other, 1, TokenKind::Access).unwrap();
        assert!(decode_token(&config, &token, TokenKind::Access).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = AppConfig::default();
        let past = Utc::now() - Duration::hours(2);
        let claims = Claims {
            sub: "1".to_string(),
            typ: TokenKind::Access,
            exp: past.timestamp(),
            iat: (past - Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(decode_token(&config, &token, TokenKind::Access).is_err());
    }
}
