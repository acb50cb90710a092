use axum::{Json, extract::State, http::StatusCode};

use super::{ApiJson, ApiPath, ApiQuery};
use crate::{
    AppState,
    auth::Requester,
    error::{ApiError, ApiResult},
    models::{CreateReviewRequest, Review, Title, UpdateReviewRequest},
    pagination::{PageParams, Paginated},
    permissions::{Action, Resource, authorize},
    repository::NewReview,
    validation,
};

pub(super) async fn find_title(state: &AppState, title_id: i64) -> ApiResult<Title> {
    state
        .repo
        .get_title(title_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Title"))
}

/// Resolves a review through its title, so a review id under the wrong title is a 404.
pub(super) async fn find_review(
    state: &AppState,
    title_id: i64,
    review_id: i64,
) -> ApiResult<Review> {
    find_title(state, title_id).await?;
    state
        .repo
        .get_review(title_id, review_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review"))
}

/// list_reviews
///
/// [Public Route] Reviews of one title, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/",
    tag = "reviews",
    params(("title_id" = i64, Path, description = "Title ID"), PageParams),
    responses(
        (status = 200, description = "Page of reviews"),
        (status = 404, description = "No such title")
    )
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    ApiPath(title_id): ApiPath<i64>,
    ApiQuery(paging): ApiQuery<PageParams>,
) -> ApiResult<Json<Paginated<Review>>> {
    find_title(&state, title_id).await?;

    let request = paging.resolve(state.config.page_size);
    let page = state.repo.list_reviews(title_id, request).await?;
    Ok(Json(Paginated::from_page(page, request)?))
}

/// create_review
///
/// [Authenticated Route] Reviews a title. One review per author and title;
/// a second attempt is a validation error.
#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews/",
    tag = "reviews",
    params(("title_id" = i64, Path, description = "Title ID")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Created", body = Review),
        (status = 400, description = "Invalid payload or already reviewed"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such title")
    )
)]
pub async fn create_review(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath(title_id): ApiPath<i64>,
    ApiJson(payload): ApiJson<CreateReviewRequest>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    authorize(Action::Create, Resource::Content, requester.user(), false)?;
    let Some(author) = requester.user() else {
        return Err(ApiError::AuthenticationRequired);
    };

    find_title(&state, title_id).await?;
    let (text, score) = validation::new_review(payload)?;
    let review = state
        .repo
        .create_review(NewReview {
            title_id,
            author_id: author.id,
            text,
            score,
        })
        .await?;

    tracing::info!(review_id = review.id, title_id, "review created");
    Ok((StatusCode::CREATED, Json(review)))
}

/// get_review
///
/// [Public Route]
#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/",
    tag = "reviews",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    responses(
        (status = 200, description = "Found", body = Review),
        (status = 404, description = "No such title or review")
    )
)]
pub async fn get_review(
    State(state): State<AppState>,
    ApiPath((title_id, review_id)): ApiPath<(i64, i64)>,
) -> ApiResult<Json<Review>> {
    Ok(Json(find_review(&state, title_id, review_id).await?))
}

/// update_review
///
/// [Author / Moderator / Admin] Partial update of text and score.
#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/",
    tag = "reviews",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Updated", body = Review),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Not the author nor staff"),
        (status = 404, description = "No such title or review")
    )
)]
pub async fn update_review(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath((title_id, review_id)): ApiPath<(i64, i64)>,
    ApiJson(payload): ApiJson<UpdateReviewRequest>,
) -> ApiResult<Json<Review>> {
    let review = find_review(&state, title_id, review_id).await?;
    authorize(
        Action::Update,
        Resource::Content,
        requester.user(),
        requester.is(review.author_id),
    )?;

    let changes = validation::review_changes(payload)?;
    let updated = state.repo.update_review(review.id, changes).await?;
    Ok(Json(updated))
}

/// delete_review
///
/// [Author / Moderator / Admin] Removes the review and its comments.
#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/",
    tag = "reviews",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author nor staff"),
        (status = 404, description = "No such title or review")
    )
)]
pub async fn delete_review(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath((title_id, review_id)): ApiPath<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let review = find_review(&state, title_id, review_id).await?;
    authorize(
        Action::Delete,
        Resource::Content,
        requester.user(),
        requester.is(review.author_id),
    )?;

    if state.repo.delete_review(review.id).await? {
        tracing::info!(review_id = review.id, title_id, "review deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Review"))
    }
}
