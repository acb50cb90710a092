use axum::{
    extract::FromRequestParts,
    http::{Method, Request, Uri, header, request::Parts},
};
use std::sync::Arc;
use yamdb_api::{
    AppConfig, ApiError, AppState, InMemoryRepository, MockNotifier, RepositoryState,
    auth::{AuthUser, Requester, TokenKind, issue_token},
    config::Env,
    models::{Role, User},
    repository::NewUser,
};

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

fn create_app_state(env: Env) -> AppState {
    let mut config = AppConfig::default();
    config.env = env;
    config.jwt_secret = TEST_JWT_SECRET.to_string();

    AppState {
        repo: Arc::new(InMemoryRepository::new()),
        notifier: Arc::new(MockNotifier::new()),
        config,
    }
}

async fn seed_user(repo: &RepositoryState, username: &str, role: Role) -> User {
    repo.create_user(NewUser {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        role,
        is_superuser: false,
        first_name: String::new(),
        last_name: String::new(),
        bio: String::new(),
        confirmation_code: None,
    })
    .await
    .unwrap()
}

/// Helper to get the mutable Parts struct from a generated Request
fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let app_state = create_app_state(Env::Production);
    let user = seed_user(&app_state.repo, "reviewer", Role::Moderator).await;
    let token = issue_token(&app_state.config, user.id, TokenKind::Access).unwrap();

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    let auth_user = auth_user.expect("valid access token should authenticate");
    assert_eq!(auth_user.id, user.id);
    assert_eq!(auth_user.username, "reviewer");
    assert_eq!(auth_user.role, Role::Moderator);
    assert!(!auth_user.is_admin());
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(matches!(auth_user, Err(ApiError::AuthenticationRequired)));
}

#[tokio::test]
async fn test_auth_failure_with_non_bearer_scheme() {
    let app_state = create_app_state(Env::Production);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_static("Basic dXNlcjpwYXNz"),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(matches!(auth_user, Err(ApiError::AuthenticationRequired)));
}

#[tokio::test]
async fn test_auth_failure_with_token_signed_by_other_secret() {
    let app_state = create_app_state(Env::Production);
    let user = seed_user(&app_state.repo, "reviewer", Role::User).await;

    let mut foreign = AppConfig::default();
    foreign.jwt_secret = "some-other-secret".to_string();
    let token = issue_token(&foreign, user.id, TokenKind::Access).unwrap();

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(matches!(auth_user, Err(ApiError::AuthenticationRequired)));
}

#[tokio::test]
async fn test_refresh_token_cannot_authenticate_requests() {
    let app_state = create_app_state(Env::Production);
    let user = seed_user(&app_state.repo, "reviewer", Role::User).await;
    let refresh = issue_token(&app_state.config, user.id, TokenKind::Refresh).unwrap();

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &refresh);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(matches!(auth_user, Err(ApiError::AuthenticationRequired)));
}

#[tokio::test]
async fn test_token_of_deleted_user_is_rejected() {
    let app_state = create_app_state(Env::Production);
    let user = seed_user(&app_state.repo, "leaving", Role::User).await;
    let token = issue_token(&app_state.config, user.id, TokenKind::Access).unwrap();
    assert!(app_state.repo.delete_user(user.id).await.unwrap());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(matches!(auth_user, Err(ApiError::AuthenticationRequired)));
}

#[tokio::test]
async fn test_role_change_applies_to_existing_token() {
    let app_state = create_app_state(Env::Local);
    let user = seed_user(&app_state.repo, "promoted", Role::User).await;
    let token = issue_token(&app_state.config, user.id, TokenKind::Access).unwrap();

    app_state
        .repo
        .update_user(
            user.id,
            yamdb_api::repository::UserChanges {
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .expect("token should still authenticate");
    assert!(auth_user.is_admin());
}

#[tokio::test]
async fn test_requester_is_anonymous_without_header() {
    let app_state = create_app_state(Env::Production);

    let mut parts = get_request_parts(Method::GET, "/api/v1/titles/".parse().unwrap());

    let requester = Requester::from_request_parts(&mut parts, &app_state)
        .await
        .expect("anonymous requests are allowed");
    assert!(requester.user().is_none());
    assert!(!requester.is(1));
}

#[tokio::test]
async fn test_requester_identifies_author() {
    let app_state = create_app_state(Env::Production);
    let user = seed_user(&app_state.repo, "author", Role::User).await;
    let token = issue_token(&app_state.config, user.id, TokenKind::Access).unwrap();

    let mut parts = get_request_parts(Method::PATCH, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let requester = Requester::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(requester.is(user.id));
    assert!(!requester.is(user.id + 1));
}

#[tokio::test]
async fn test_requester_rejects_bad_token_instead_of_downgrading() {
    let app_state = create_app_state(Env::Production);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, "not-a-jwt");

    let requester = Requester::from_request_parts(&mut parts, &app_state).await;

    assert!(matches!(requester, Err(ApiError::AuthenticationRequired)));
}
