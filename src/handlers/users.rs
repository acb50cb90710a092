use axum::{Json, extract::State, http::StatusCode};

use super::{ApiJson, ApiPath, ApiQuery, SearchParams};
use crate::{
    AppState,
    auth::Requester,
    error::{ApiError, ApiResult},
    models::{CreateUserRequest, UpdateUserRequest, User, UserProfile},
    pagination::{PageParams, Paginated},
    permissions::{Action, Resource, authorize},
    validation,
};

async fn find_user(state: &AppState, username: &str) -> ApiResult<User> {
    state
        .repo
        .get_user_by_username(username)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

/// get_me
///
/// [Authenticated Route] The requester's own profile.
#[utoipa::path(
    get,
    path = "/api/v1/users/me/",
    tag = "users",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_me(
    requester: Requester,
    State(state): State<AppState>,
) -> ApiResult<Json<UserProfile>> {
    authorize(Action::Read, Resource::OwnProfile, requester.user(), false)?;
    let Some(me) = requester.user() else {
        return Err(ApiError::AuthenticationRequired);
    };

    let user = state
        .repo
        .get_user(me.id)
        .await?
        .ok_or(ApiError::AuthenticationRequired)?;
    Ok(Json(user.into()))
}

/// update_me
///
/// [Authenticated Route] Partial update of the requester's own profile. The
/// `role` field is read-only here and silently ignored.
#[utoipa::path(
    patch,
    path = "/api/v1/users/me/",
    tag = "users",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 400, description = "Invalid or conflicting field"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn update_me(
    requester: Requester,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<UserProfile>> {
    authorize(Action::Update, Resource::OwnProfile, requester.user(), false)?;
    let Some(me) = requester.user() else {
        return Err(ApiError::AuthenticationRequired);
    };

    let changes = validation::user_changes(payload, false)?;
    let user = state.repo.update_user(me.id, changes).await?;
    Ok(Json(user.into()))
}

/// list_users
///
/// [Admin Route] Paginated account listing, searchable by username.
#[utoipa::path(
    get,
    path = "/api/v1/users/",
    tag = "users",
    params(PageParams, SearchParams),
    responses(
        (status = 200, description = "Page of users"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_users(
    requester: Requester,
    State(state): State<AppState>,
    ApiQuery(paging): ApiQuery<PageParams>,
    ApiQuery(search): ApiQuery<SearchParams>,
) -> ApiResult<Json<Paginated<UserProfile>>> {
    authorize(Action::Read, Resource::Account, requester.user(), false)?;

    let request = paging.resolve(state.config.page_size);
    let page = state.repo.list_users(search.term(), request).await?;
    Ok(Json(Paginated::from_page(page, request)?))
}

/// create_user
///
/// [Admin Route] Creates an account directly, with any role. The account has
/// no confirmation code until its owner goes through signup.
#[utoipa::path(
    post,
    path = "/api/v1/users/",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserProfile),
        (status = 400, description = "Invalid or conflicting field"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_user(
    requester: Requester,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    authorize(Action::Create, Resource::Account, requester.user(), false)?;

    let new_user = validation::new_user(payload)?;
    let user = state.repo.create_user(new_user).await?;
    tracing::info!(user_id = user.id, role = user.role.as_str(), "user created by admin");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// get_user
///
/// [Admin Route] One account by username.
#[utoipa::path(
    get,
    path = "/api/v1/users/{username}/",
    tag = "users",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "Found", body = UserProfile),
        (status = 404, description = "No such user")
    )
)]
pub async fn get_user(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
) -> ApiResult<Json<UserProfile>> {
    authorize(Action::Read, Resource::Account, requester.user(), false)?;
    Ok(Json(find_user(&state, &username).await?.into()))
}

/// update_user
///
/// [Admin Route] Partial update of any account, including its role.
#[utoipa::path(
    patch,
    path = "/api/v1/users/{username}/",
    tag = "users",
    params(("username" = String, Path, description = "Username")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 400, description = "Invalid or conflicting field"),
        (status = 404, description = "No such user")
    )
)]
pub async fn update_user(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<UserProfile>> {
    authorize(Action::Update, Resource::Account, requester.user(), false)?;

    let user = find_user(&state, &username).await?;
    let changes = validation::user_changes(payload, true)?;
    let user = state.repo.update_user(user.id, changes).await?;
    Ok(Json(user.into()))
}

/// delete_user
///
/// [Admin Route] Deletes an account together with its reviews and comments.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{username}/",
    tag = "users",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such user")
    )
)]
pub async fn delete_user(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
) -> ApiResult<StatusCode> {
    authorize(Action::Delete, Resource::Account, requester.user(), false)?;

    let user = find_user(&state, &username).await?;
    if state.repo.delete_user(user.id).await? {
        tracing::info!(user_id = user.id, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("User"))
    }
}
