use rand::{Rng, rng};

use crate::{
    auth::{self, TokenKind},
    config::AppConfig,
    error::{ApiError, ApiResult, FieldErrors},
    models::{AccessTokenResponse, Role, SignupResponse, TokenResponse, User},
    notifier::{self, ConfirmationEmail, NotifierState},
    repository::{Duplicate, NewUser, RepositoryState, UserChanges},
};

/// Number of decimal digits in a confirmation code.
pub const CONFIRMATION_CODE_LEN: usize = 15;

/// Generates a fresh confirmation code of [`CONFIRMATION_CODE_LEN`] random digits.
pub fn generate_confirmation_code() -> String {
    let mut rng = rng();
    (0..CONFIRMATION_CODE_LEN)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// signup
///
/// Registers `(username, email)` or, when exactly that pair already exists,
/// re-issues its confirmation code. Either way a new code is generated,
/// stored, and mailed in the background.
///
/// A username or an email that belongs to a different account is a validation
/// error on that field; both are reported when both clash.
pub async fn signup(
    repo: &RepositoryState,
    notifier: &NotifierState,
    username: String,
    email: String,
) -> ApiResult<SignupResponse> {
    let by_username = repo.get_user_by_username(&username).await?;
    let by_email = repo.get_user_by_email(&email).await?;
    let code = generate_confirmation_code();

    let user = match (by_username, by_email) {
        (Some(existing), Some(same)) if existing.id == same.id => {
            tracing::info!(user_id = existing.id, "re-issuing confirmation code");
            repo.set_confirmation_code(existing.id, Some(code.clone()))
                .await?;
            existing
        }
        (None, None) => {
            let user = repo
                .create_user(NewUser {
                    username,
                    email,
                    role: Role::User,
                    is_superuser: false,
                    first_name: String::new(),
                    last_name: String::new(),
                    bio: String::new(),
                    confirmation_code: Some(code.clone()),
                })
                .await?;
            tracing::info!(user_id = user.id, "user signed up");
            user
        }
        (by_username, by_email) => {
            let mut errors = FieldErrors::new();
            if by_username.is_some() {
                errors.add("username", Duplicate::Username.to_string());
            }
            if by_email.is_some() {
                errors.add("email", Duplicate::Email.to_string());
            }
            return Err(ApiError::Validation(errors));
        }
    };

    notifier::dispatch(
        notifier.clone(),
        ConfirmationEmail {
            username: user.username.clone(),
            email: user.email.clone(),
            code,
        },
    );

    Ok(SignupResponse {
        username: user.username,
        email: user.email,
    })
}

/// obtain_token
///
/// Exchanges a confirmation code for an access/refresh token pair. The code is
/// cleared on success, so each issued code works once.
pub async fn obtain_token(
    repo: &RepositoryState,
    config: &AppConfig,
    username: &str,
    code: &str,
) -> ApiResult<TokenResponse> {
    let user = repo
        .get_user_by_username(username)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    if user.confirmation_code.as_deref() != Some(code) {
        tracing::debug!(user_id = user.id, "confirmation code mismatch");
        return Err(ApiError::field(
            "confirmation_code",
            "Invalid confirmation code.",
        ));
    }

    repo.set_confirmation_code(user.id, None).await?;
    tracing::info!(user_id = user.id, "token issued");

    Ok(TokenResponse {
        token: auth::issue_token(config, user.id, TokenKind::Access)?,
        refresh: auth::issue_token(config, user.id, TokenKind::Refresh)?,
    })
}

/// refresh_token
///
/// Trades a refresh token for a new access token, as long as its user still exists.
pub async fn refresh_token(
    repo: &RepositoryState,
    config: &AppConfig,
    refresh: &str,
) -> ApiResult<AccessTokenResponse> {
    let user_id = auth::decode_token(config, refresh, TokenKind::Refresh)?;
    if repo.get_user(user_id).await?.is_none() {
        return Err(ApiError::AuthenticationRequired);
    }

    Ok(AccessTokenResponse {
        token: auth::issue_token(config, user_id, TokenKind::Access)?,
    })
}

/// ensure_admin
///
/// Makes sure a superuser named `username` exists, creating it on first start.
/// An existing account with that name is promoted to the admin role.
pub async fn ensure_admin(repo: &RepositoryState, username: &str, email: &str) -> ApiResult<User> {
    if let Some(user) = repo.get_user_by_username(username).await? {
        if user.is_admin() {
            return Ok(user);
        }
        tracing::info!(user_id = user.id, "promoting bootstrap account to admin");
        let changes = UserChanges {
            role: Some(Role::Admin),
            ..UserChanges::default()
        };
        return Ok(repo.update_user(user.id, changes).await?);
    }

    let user = repo
        .create_user(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            role: Role::Admin,
            is_superuser: true,
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
            confirmation_code: None,
        })
        .await?;
    tracing::info!(user_id = user.id, "bootstrap superuser created");
    Ok(user)
}
