//! Categories and genres: both are `(name, slug)` pairs addressed by slug, with
//! list/create/retrieve/delete and no update.

use axum::{Json, extract::State, http::StatusCode};

use super::{ApiJson, ApiPath, ApiQuery, SearchParams};
use crate::{
    AppState,
    auth::Requester,
    error::{ApiError, ApiResult},
    models::{CreateTaxonRequest, Taxon},
    pagination::{PageParams, Paginated},
    permissions::{Action, Resource, authorize},
    repository::TaxonKind,
    validation,
};

async fn list(
    kind: TaxonKind,
    state: &AppState,
    paging: PageParams,
    search: &SearchParams,
) -> ApiResult<Json<Paginated<Taxon>>> {
    let request = paging.resolve(state.config.page_size);
    let page = state.repo.list_taxa(kind, search.term(), request).await?;
    Ok(Json(Paginated::from_page(page, request)?))
}

async fn create(
    kind: TaxonKind,
    requester: &Requester,
    state: &AppState,
    payload: CreateTaxonRequest,
) -> ApiResult<(StatusCode, Json<Taxon>)> {
    authorize(Action::Create, Resource::Catalog, requester.user(), false)?;

    let taxon = validation::new_taxon(payload)?;
    let created = state.repo.create_taxon(kind, taxon).await?;
    tracing::info!(kind = kind.label(), slug = %created.slug, "catalog entry created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn retrieve(kind: TaxonKind, state: &AppState, slug: &str) -> ApiResult<Json<Taxon>> {
    state
        .repo
        .get_taxon(kind, slug)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(kind.label()))
}

async fn delete(
    kind: TaxonKind,
    requester: &Requester,
    state: &AppState,
    slug: &str,
) -> ApiResult<StatusCode> {
    authorize(Action::Delete, Resource::Catalog, requester.user(), false)?;

    if state.repo.delete_taxon(kind, slug).await? {
        tracing::info!(kind = kind.label(), slug, "catalog entry deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(kind.label()))
    }
}

// --- Categories ---

#[utoipa::path(
    get,
    path = "/api/v1/categories/",
    tag = "catalog",
    params(PageParams, SearchParams),
    responses((status = 200, description = "Page of categories"))
)]
pub async fn list_categories(
    State(state): State<AppState>,
    ApiQuery(paging): ApiQuery<PageParams>,
    ApiQuery(search): ApiQuery<SearchParams>,
) -> ApiResult<Json<Paginated<Taxon>>> {
    list(TaxonKind::Category, &state, paging, &search).await
}

#[utoipa::path(
    post,
    path = "/api/v1/categories/",
    tag = "catalog",
    request_body = CreateTaxonRequest,
    responses(
        (status = 201, description = "Created", body = Taxon),
        (status = 400, description = "Invalid payload or duplicate slug"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_category(
    requester: Requester,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateTaxonRequest>,
) -> ApiResult<(StatusCode, Json<Taxon>)> {
    create(TaxonKind::Category, &requester, &state, payload).await
}

#[utoipa::path(
    get,
    path = "/api/v1/categories/{slug}/",
    tag = "catalog",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 200, description = "Found", body = Taxon),
        (status = 404, description = "No such category")
    )
)]
pub async fn get_category(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<Json<Taxon>> {
    retrieve(TaxonKind::Category, &state, &slug).await
}

/// delete_category
///
/// [Admin Route] Titles in the category keep existing, without a category.
#[utoipa::path(
    delete,
    path = "/api/v1/categories/{slug}/",
    tag = "catalog",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such category")
    )
)]
pub async fn delete_category(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete(TaxonKind::Category, &requester, &state, &slug).await
}

// --- Genres ---

#[utoipa::path(
    get,
    path = "/api/v1/genres/",
    tag = "catalog",
    params(PageParams, SearchParams),
    responses((status = 200, description = "Page of genres"))
)]
pub async fn list_genres(
    State(state): State<AppState>,
    ApiQuery(paging): ApiQuery<PageParams>,
    ApiQuery(search): ApiQuery<SearchParams>,
) -> ApiResult<Json<Paginated<Taxon>>> {
    list(TaxonKind::Genre, &state, paging, &search).await
}

#[utoipa::path(
    post,
    path = "/api/v1/genres/",
    tag = "catalog",
    request_body = CreateTaxonRequest,
    responses(
        (status = 201, description = "Created", body = Taxon),
        (status = 400, description = "Invalid payload or duplicate slug"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_genre(
    requester: Requester,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateTaxonRequest>,
) -> ApiResult<(StatusCode, Json<Taxon>)> {
    create(TaxonKind::Genre, &requester, &state, payload).await
}

#[utoipa::path(
    get,
    path = "/api/v1/genres/{slug}/",
    tag = "catalog",
    params(("slug" = String, Path, description = "Genre slug")),
    responses(
        (status = 200, description = "Found", body = Taxon),
        (status = 404, description = "No such genre")
    )
)]
pub async fn get_genre(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<Json<Taxon>> {
    retrieve(TaxonKind::Genre, &state, &slug).await
}

/// delete_genre
///
/// [Admin Route] Titles lose the genre; nothing else is removed.
#[utoipa::path(
    delete,
    path = "/api/v1/genres/{slug}/",
    tag = "catalog",
    params(("slug" = String, Path, description = "Genre slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such genre")
    )
)]
pub async fn delete_genre(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<StatusCode> {
    delete(TaxonKind::Genre, &requester, &state, &slug).await
}
