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
    priority::{CreatePriority, Priority, PriorityQuery, UpdatePriority},
};
use utils::response::ApiResponse;

use crate::{
    error::ApiError, http::auth::CurrentUser, middleware::load_priority_middleware,
    state::AppState,
};

pub async fn get_priorities(
    State(state): State<AppState>,
    Query(query): Query<PriorityQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Priority>>>, ApiError> {
    let page = state.page_request(query.page, query.page_size);
    let priorities = Priority::find_page(&state.db().pool, &query, page).await?;
    Ok(ResponseJson(ApiResponse::success(priorities)))
}

pub async fn get_priority(
    Extension(priority): Extension<Priority>,
) -> Result<ResponseJson<ApiResponse<Priority>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(priority)))
}

pub async fn create_priority(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreatePriority>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Priority>>), ApiError> {
    let priority = Priority::create(&state.db().pool, &payload, Some(user.id())).await?;
    tracing::debug!("Created priority {} (level {})", priority.name, priority.level);
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(priority))))
}

pub async fn update_priority(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(priority): Extension<Priority>,
    Json(payload): Json<UpdatePriority>,
) -> Result<ResponseJson<ApiResponse<Priority>>, ApiError> {
    let priority =
        Priority::update(&state.db().pool, priority.id, &payload, Some(user.id())).await?;
    Ok(ResponseJson(ApiResponse::success(priority)))
}

pub async fn delete_priority(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(priority): Extension<Priority>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    Priority::delete(&state.db().pool, priority.id, Some(user.id())).await?;
    tracing::debug!("Deleted priority {}", priority.id);
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let priority_id_router = Router::new()
        .route(
            "/",
            get(get_priority)
                .put(update_priority)
                .delete(delete_priority),
        )
        .layer(from_fn_with_state(state.clone(), load_priority_middleware));

    let inner = Router::new()
        .route("/", get(get_priorities).post(create_priority))
        .nest("/{id}", priority_id_router);

    Router::new().nest("/priorities", inner)
}
