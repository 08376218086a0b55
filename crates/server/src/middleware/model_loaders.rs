use std::{fmt::Display, future::Future};

use axum::{
    Extension,
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use db::models::{
    priority::Priority, project::Project, status::Status, tag::Tag, task::Task, user::User,
};

use crate::{error::ApiError, http::auth::CurrentUser, state::AppState};

async fn fetch_model_or_status<M, E, Fut>(
    model_name: &'static str,
    model_id: i64,
    load_future: Fut,
) -> Result<M, ApiError>
where
    E: Display,
    Fut: Future<Output = Result<Option<M>, E>>,
{
    match load_future.await {
        Ok(Some(model)) => Ok(model),
        Ok(None) => {
            tracing::warn!("{model_name} {model_id} not found");
            Err(ApiError::NotFound(format!("{model_name} not found")))
        }
        Err(error) => {
            tracing::error!("Failed to fetch {model_name} {model_id}: {error}");
            Err(ApiError::Internal(format!("Failed to load {model_name}")))
        }
    }
}

async fn load_request_extension<M, E, Fut>(
    request: Request,
    next: Next,
    model_name: &'static str,
    model_id: i64,
    load_future: Fut,
) -> Result<Response, ApiError>
where
    M: Clone + Send + Sync + 'static,
    E: Display,
    Fut: Future<Output = Result<Option<M>, E>>,
{
    let model = fetch_model_or_status(model_name, model_id, load_future).await?;
    let mut request = request;
    request.extensions_mut().insert(model);
    Ok(next.run(request).await)
}

pub async fn load_priority_middleware(
    State(state): State<AppState>,
    Path(priority_id): Path<i64>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    load_request_extension(
        request,
        next,
        "Priority",
        priority_id,
        Priority::find_by_id(&state.db().pool, priority_id),
    )
    .await
}

pub async fn load_status_middleware(
    State(state): State<AppState>,
    Path(status_id): Path<i64>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    load_request_extension(
        request,
        next,
        "Status",
        status_id,
        Status::find_by_id(&state.db().pool, status_id),
    )
    .await
}

/// Only the requester's own tags resolve.
pub async fn load_tag_middleware(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(tag_id): Path<i64>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    load_request_extension(
        request,
        next,
        "Tag",
        tag_id,
        Tag::find_owned(&state.db().pool, user.id(), tag_id),
    )
    .await
}

/// Only the requester's own projects resolve.
pub async fn load_project_middleware(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(project_id): Path<i64>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    load_request_extension(
        request,
        next,
        "Project",
        project_id,
        Project::find_owned(&state.db().pool, user.id(), project_id),
    )
    .await
}

/// Resolves tasks the requester can see; anything else is a 404.
pub async fn load_task_middleware(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(task_id): Path<i64>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    load_request_extension(
        request,
        next,
        "Task",
        task_id,
        Task::find_visible(&state.db().pool, user.id(), task_id),
    )
    .await
}

pub async fn load_user_middleware(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    load_request_extension(
        request,
        next,
        "User",
        user_id,
        User::find_by_id(&state.db().pool, user_id),
    )
    .await
}
