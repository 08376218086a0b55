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
    status::{CreateStatus, Status, StatusQuery, UpdateStatus},
};
use utils::response::ApiResponse;

use crate::{
    error::ApiError, http::auth::CurrentUser, middleware::load_status_middleware,
    state::AppState,
};

pub async fn get_statuses(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Status>>>, ApiError> {
    let page = state.page_request(query.page, query.page_size);
    let statuses = Status::find_page(&state.db().pool, &query, page).await?;
    Ok(ResponseJson(ApiResponse::success(statuses)))
}

pub async fn get_status(
    Extension(status): Extension<Status>,
) -> Result<ResponseJson<ApiResponse<Status>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(status)))
}

pub async fn create_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateStatus>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Status>>), ApiError> {
    let status = Status::create(&state.db().pool, &payload, Some(user.id())).await?;
    tracing::debug!("Created status {} ({})", status.name, status.color);
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(status))))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(status): Extension<Status>,
    Json(payload): Json<UpdateStatus>,
) -> Result<ResponseJson<ApiResponse<Status>>, ApiError> {
    let status =
        Status::update(&state.db().pool, status.id, &payload, Some(user.id())).await?;
    Ok(ResponseJson(ApiResponse::success(status)))
}

pub async fn delete_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(status): Extension<Status>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    Status::delete(&state.db().pool, status.id, Some(user.id())).await?;
    tracing::debug!("Deleted status {}", status.id);
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let status_id_router = Router::new()
        .route(
            "/",
            get(get_status)
                .put(update_status)
                .delete(delete_status),
        )
        .layer(from_fn_with_state(state.clone(), load_status_middleware));

    let inner = Router::new()
        .route("/", get(get_statuses).post(create_status))
        .nest("/{id}", status_id_router);

    Router::new().nest("/statuses", inner)
}
