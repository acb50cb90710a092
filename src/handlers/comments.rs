use axum::{Json, extract::State, http::StatusCode};

use super::{
    ApiJson, ApiPath, ApiQuery,
    reviews::find_review,
};
use crate::{
    AppState,
    auth::Requester,
    error::{ApiError, ApiResult},
    models::{Comment, CommentRequest},
    pagination::{PageParams, Paginated},
    permissions::{Action, Resource, authorize},
    repository::NewComment,
    validation,
};

async fn find_comment(
    state: &AppState,
    title_id: i64,
    review_id: i64,
    comment_id: i64,
) -> ApiResult<Comment> {
    let review = find_review(state, title_id, review_id).await?;
    state
        .repo
        .get_comment(review.id, comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))
}

/// list_comments
///
/// [Public Route] Comments on one review, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/",
    tag = "comments",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        PageParams
    ),
    responses(
        (status = 200, description = "Page of comments"),
        (status = 404, description = "No such title or review")
    )
)]
pub async fn list_comments(
    State(state): State<AppState>,
    ApiPath((title_id, review_id)): ApiPath<(i64, i64)>,
    ApiQuery(paging): ApiQuery<PageParams>,
) -> ApiResult<Json<Paginated<Comment>>> {
    let review = find_review(&state, title_id, review_id).await?;

    let request = paging.resolve(state.config.page_size);
    let page = state.repo.list_comments(review.id, request).await?;
    Ok(Json(Paginated::from_page(page, request)?))
}

/// create_comment
///
/// [Authenticated Route] Replies to a review.
#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/",
    tag = "comments",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    request_body = CommentRequest,
    responses(
        (status = 201, description = "Created", body = Comment),
        (status = 400, description = "Empty text"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such title or review")
    )
)]
pub async fn create_comment(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath((title_id, review_id)): ApiPath<(i64, i64)>,
    ApiJson(payload): ApiJson<CommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    authorize(Action::Create, Resource::Content, requester.user(), false)?;
    let Some(author) = requester.user() else {
        return Err(ApiError::AuthenticationRequired);
    };

    let review = find_review(&state, title_id, review_id).await?;
    let text = validation::comment_text(payload)?;
    let comment = state
        .repo
        .create_comment(NewComment {
            review_id: review.id,
            author_id: author.id,
            text,
        })
        .await?;

    tracing::info!(comment_id = comment.id, review_id = review.id, "comment created");
    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}/",
    tag = "comments",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 200, description = "Found", body = Comment),
        (status = 404, description = "No such title, review or comment")
    )
)]
pub async fn get_comment(
    State(state): State<AppState>,
    ApiPath((title_id, review_id, comment_id)): ApiPath<(i64, i64, i64)>,
) -> ApiResult<Json<Comment>> {
    Ok(Json(find_comment(&state, title_id, review_id, comment_id).await?))
}

/// update_comment
///
/// [Author / Moderator / Admin] Replaces the comment text.
#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}/",
    tag = "comments",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    request_body = CommentRequest,
    responses(
        (status = 200, description = "Updated", body = Comment),
        (status = 403, description = "Not the author nor staff"),
        (status = 404, description = "No such title, review or comment")
    )
)]
pub async fn update_comment(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath((title_id, review_id, comment_id)): ApiPath<(i64, i64, i64)>,
    ApiJson(payload): ApiJson<CommentRequest>,
) -> ApiResult<Json<Comment>> {
    let comment = find_comment(&state, title_id, review_id, comment_id).await?;
    authorize(
        Action::Update,
        Resource::Content,
        requester.user(),
        requester.is(comment.author_id),
    )?;

    // A PATCH without `text` leaves the comment as it is.
    let Some(text) = payload.text else {
        return Ok(Json(comment));
    };
    let text = validation::comment_text(CommentRequest { text: Some(text) })?;
    let updated = state.repo.update_comment(comment.id, text).await?;
    Ok(Json(updated))
}

/// delete_comment
///
/// [Author / Moderator / Admin]
#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}/",
    tag = "comments",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author nor staff"),
        (status = 404, description = "No such title, review or comment")
    )
)]
pub async fn delete_comment(
    requester: Requester,
    State(state): State<AppState>,
    ApiPath((title_id, review_id, comment_id)): ApiPath<(i64, i64, i64)>,
) -> ApiResult<StatusCode> {
    let comment = find_comment(&state, title_id, review_id, comment_id).await?;
    authorize(
        Action::Delete,
        Resource::Content,
        requester.user(),
        requester.is(comment.author_id),
    )?;

    if state.repo.delete_comment(comment.id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Comment"))
    }
}
