use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    page::Page,
    tag::{CreateTag, Tag, TagQuery, UpdateTag},
};
use utils::response::ApiResponse;

use crate::{
    error::ApiError, http::auth::CurrentUser, middleware::load_tag_middleware, state::AppState,
};

pub async fn get_tags(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<TagQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Tag>>>, ApiError> {
    let page = state.page_request(query.page, query.page_size);
    let tags = Tag::find_page(&state.db().pool, user.id(), &query, page).await?;
    Ok(ResponseJson(ApiResponse::success(tags)))
}

pub async fn get_tag(
    Extension(tag): Extension<Tag>,
) -> Result<ResponseJson<ApiResponse<Tag>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(tag)))
}

pub async fn create_tag(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateTag>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Tag>>), ApiError> {
    let tag = Tag::create(&state.db().pool, user.id(), &payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(tag))))
}

pub async fn update_tag(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(tag): Extension<Tag>,
    Json(payload): Json<UpdateTag>,
) -> Result<ResponseJson<ApiResponse<Tag>>, ApiError> {
    let tag = Tag::update(&state.db().pool, user.id(), tag.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(tag)))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(tag): Extension<Tag>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    Tag::delete(&state.db().pool, user.id(), tag.id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let tag_id_router = Router::new()
        .route("/", get(get_tag).put(update_tag).delete(delete_tag))
        .layer(from_fn_with_state(state.clone(), load_tag_middleware));

    let inner = Router::new()
        .route("/", get(get_tags).post(create_tag))
        .nest("/{id}", tag_id_router);

    Router::new().nest("/tags", inner)
}
