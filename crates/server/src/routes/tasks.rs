use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::Utc;
use db::models::{
    page::Page,
    task::{
        CreateTask, OverdueTasks, StatusChange, Task, TaskDetail, TaskHistoryEntry, TaskQuery,
        TaskSummary, UpdateTask,
    },
};
use serde::Deserialize;
use utils::response::ApiResponse;

use crate::{
    error::ApiError, http::auth::CurrentUser, middleware::load_task_middleware, state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct ChangeStatusRequest {
    #[serde(default)]
    pub status_id: Option<i64>,
}

impl ChangeStatusRequest {
    /// An empty body is treated as `{}`, whatever the content type.
    fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|err| ApiError::BadRequest(format!("Invalid JSON body: {err}")))
    }
}

pub async fn get_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<TaskQuery>,
) -> Result<ResponseJson<ApiResponse<Page<TaskSummary>>>, ApiError> {
    let page = state.page_request(query.page, query.page_size);
    let tasks = Task::find_page(&state.db().pool, user.id(), &query, page).await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn get_upcoming_week(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<TaskDetail>>>, ApiError> {
    let tasks = Task::upcoming_week(&state.db().pool, user.id(), Utc::now()).await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn get_overdue(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<OverdueTasks>>, ApiError> {
    let overdue = Task::overdue(&state.db().pool, user.id(), Utc::now()).await?;
    Ok(ResponseJson(ApiResponse::success(overdue)))
}

pub async fn get_urgent_or_tomorrow(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<TaskDetail>>>, ApiError> {
    let tasks = Task::urgent_or_tomorrow(&state.db().pool, user.id(), Utc::now()).await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn get_others_in_progress_or_cancelled(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<TaskDetail>>>, ApiError> {
    let tasks = Task::others_in_progress_or_cancelled(&state.db().pool, user.id()).await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn get_task(
    Extension(task): Extension<TaskDetail>,
) -> Result<ResponseJson<ApiResponse<TaskDetail>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateTask>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<TaskDetail>>), ApiError> {
    let task = Task::create(&state.db().pool, user.id(), &payload).await?;
    tracing::debug!(
        "Created task '{}' ({}) in project {}",
        task.title,
        task.id,
        task.project
    );
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(task))))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(existing): Extension<TaskDetail>,
    Json(payload): Json<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<TaskDetail>>, ApiError> {
    let task = Task::update(&state.db().pool, user.id(), existing.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(task): Extension<TaskDetail>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    Task::delete(&state.db().pool, user.id(), task.id).await?;
    tracing::debug!("Deleted task {}", task.id);
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn change_task_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(task): Extension<TaskDetail>,
    body: Bytes,
) -> Result<ResponseJson<ApiResponse<StatusChange>>, ApiError> {
    let payload = ChangeStatusRequest::from_body(&body)?;
    let change =
        Task::change_status(&state.db().pool, user.id(), task.id, payload.status_id).await?;
    Ok(ResponseJson(ApiResponse::success(change)))
}

pub async fn get_task_history(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(task): Extension<TaskDetail>,
) -> Result<ResponseJson<ApiResponse<Vec<TaskHistoryEntry>>>, ApiError> {
    let history = Task::history(&state.db().pool, user.id(), task.id).await?;
    Ok(ResponseJson(ApiResponse::success(history)))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let task_id_router = Router::new()
        .route("/", get(get_task).put(update_task).delete(delete_task))
        .route("/change_status", post(change_task_status))
        .route("/history", get(get_task_history))
        .layer(from_fn_with_state(state.clone(), load_task_middleware));

    let inner = Router::new()
        .route("/", get(get_tasks).post(create_task))
        .route("/upcoming_week", get(get_upcoming_week))
        .route("/overdue", get(get_overdue))
        .route("/urgent_or_tomorrow", get(get_urgent_or_tomorrow))
        .route(
            "/others_in_progress_or_cancelled",
            get(get_others_in_progress_or_cancelled),
        )
        .nest("/{id}", task_id_router);

    Router::new().nest("/tasks", inner)
}
