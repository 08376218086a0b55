use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    page::Page,
    project::{CreateProject, Project, ProjectQuery, ProjectSummary, UpdateProject},
};
use serde::Serialize;
use utils::response::ApiResponse;

use crate::{
    error::ApiError, http::auth::CurrentUser, middleware::load_project_middleware,
    state::AppState,
};

/// Answer of the archive action. Archiving does not change the project yet.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOutcome {
    pub status: &'static str,
    pub message: String,
    pub project_id: i64,
}

pub async fn get_projects(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ProjectQuery>,
) -> Result<ResponseJson<ApiResponse<Page<ProjectSummary>>>, ApiError> {
    let page = state.page_request(query.page, query.page_size);
    let projects = Project::find_page(&state.db().pool, user.id(), &query, page).await?;
    Ok(ResponseJson(ApiResponse::success(projects)))
}

pub async fn get_my_projects(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<Project>>>, ApiError> {
    let projects = Project::find_all_for_owner(&state.db().pool, user.id()).await?;
    Ok(ResponseJson(ApiResponse::success(projects)))
}

pub async fn get_project(
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(project)))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateProject>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Project>>), ApiError> {
    let project = Project::create(&state.db().pool, user.id(), &payload).await?;
    tracing::debug!("Created project '{}' ({})", project.name, project.id);
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(project))))
}

pub async fn update_project(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(existing): Extension<Project>,
    Json(payload): Json<UpdateProject>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    let project = Project::update(&state.db().pool, user.id(), existing.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(project)))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    Project::delete(&state.db().pool, user.id(), project.id).await?;
    tracing::info!(
        "Deleted project {} with {} task(s)",
        project.id,
        project.tasks_count
    );
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn archive_project(
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<ArchiveOutcome>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(ArchiveOutcome {
        status: "success",
        message: format!("Project '{}' archived", project.name),
        project_id: project.id,
    })))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let project_id_router = Router::new()
        .route(
            "/",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/archive", post(archive_project))
        .layer(from_fn_with_state(state.clone(), load_project_middleware));

    let projects_router = Router::new()
        .route("/", get(get_projects).post(create_project))
        .route("/my_projects", get(get_my_projects))
        .nest("/{id}", project_id_router);

    Router::new().nest("/projects", projects_router)
}
