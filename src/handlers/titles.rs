use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use utoipa::IntoParams;

use super::{ApiJson, ApiPath, ApiQuery};
use crate::{
    AppState,
    auth::Requester,
    error::{ApiError, ApiResult},
    models::{CreateTitleRequest, Title, UpdateTitleRequest},
    pagination::{PageParams, Paginated},
    permissions::{Action, Resource, authorize},
    repository::TitleFilter,
    validation,
};

/// TitleParams
///
/// Filters accepted by `GET /titles/`. They combine with AND.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TitleParams {
    /// Category slug (exact).
    pub category: Option<String>,
    /// Genre slug (exact).
    pub genre: Option<String>,
    /// Release year (exact).
    pub year: Option<i32>,
    /// Case-insensitive substring of the title name.
    pub name: Option<String>,
}

impl From<TitleParams> for TitleFilter {
    fn from(params: TitleParams) -> Self {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        Self {
            category: non_empty(params.category),
            genre: non_empty(params.genre),
            year: params.year,
            name: non_empty(params.name),
        }
    }
}

/// list_titles
///
/// [Public Route] Paginated, filterable catalog. Each title carries its current rating.
#[utoipa::path(
    get,
    path = "/api/v1/titles/",
    tag = "titles",
    params(PageParams, TitleParams),
    responses((status = 200, description = "Page of titles"))
)]
pub async fn list_titles(
    State(state): State<AppState>,
    ApiQuery(paging): ApiQuery<PageParams>,
    ApiQuery(params): ApiQuery<TitleParams>,
) -> ApiResult<Json<Paginated<Title>>> {
    let request = paging.resolve(state.config.page_size);
    let filter = TitleFilter::from(params);
    let page = state.repo.list_titles(&filter, request).await?;
    Ok(Json(Paginated::from_page(page, request)?))
}

/// create_title
///
/// [Admin Route] Genres and category are given by slug and must already exist.
#[utoipa::path(
    post,
    path = "/api/v1/titles/",
    tag = "titles",
    request_body = CreateTitleRequest,
    responses(
        (status = 201, description = "Created", body = Title),
        (status = 400, description = "Invalid payload or unknown slug"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_title(
    requester: Requester,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateTitleRequest>,
) -> ApiResult<(StatusCode, Json<Title>)> {
    authorize(Action::Create, Resource::Catalog, requester.user(), false)?;

    let title = validation::new_title(payload)?;
    let created = state.repo.create_title(title).await?;
    tracing::info!(title_id = created.id, "title created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// get_title
///
/// [Public Route] One title with its rating.
#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/",
    tag = "titles",
    params(("title_id" = i64, Path, description = "Title ID")),
    responses(
        (status = 200, description = "Found", body = Title),
        (status = 404, description = "No such title")
    )
)]
pub async fn get_title(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Title>> {
    state
        .repo
        .get_title(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Title"))
}

/// update_title
///
/// [Admin Route] Partial update. A given `genre` list replaces the current one;
/// `"category": null` detaches the category.
#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/",
    tag = "titles",
    params(("title_id" = i64, Path, description = "Title ID")),
    request_body = UpdateTitleRequest,
    responses(
        (status = 200, description = "Updated", body = Title),
        (status = 400, description = "Invalid payload or unknown slug"),
        (status = 404, description = "No such title")
    )
)]
pub async fn update_title(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<UpdateTitleRequest>,
) -> ApiResult<Json<Title>> {
    authorize(Action::Update, Resource::Catalog, requester.user(), false)?;

    let changes = validation::title_changes(payload)?;
    let updated = state.repo.update_title(id, changes).await?;
    Ok(Json(updated))
}

/// delete_title
///
/// [Admin Route] Removes the title with all of its reviews and their comments.
#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/",
    tag = "titles",
    params(("title_id" = i64, Path, description = "Title ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such title")
    )
)]
pub async fn delete_title(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    authorize(Action::Delete, Resource::Catalog, requester.user(), false)?;

    if state.repo.delete_title(id).await? {
        tracing::info!(title_id = id, "title deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Title"))
    }
}
