use axum::{
    Extension, Router,
    extract::{Query, State},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    page::Page,
    user::{User, UserQuery},
};
use utils::response::ApiResponse;

use crate::{
    error::ApiError, http::auth::CurrentUser, middleware::load_user_middleware, state::AppState,
};

pub async fn get_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<ResponseJson<ApiResponse<Page<User>>>, ApiError> {
    let page = state.page_request(query.page, query.page_size);
    let users = User::find_page(&state.db().pool, &query, page).await?;
    Ok(ResponseJson(ApiResponse::success(users)))
}

pub async fn get_me(Extension(user): Extension<CurrentUser>) -> ResponseJson<ApiResponse<User>> {
    ResponseJson(ApiResponse::success(user.0))
}

pub async fn get_user(Extension(user): Extension<User>) -> ResponseJson<ApiResponse<User>> {
    ResponseJson(ApiResponse::success(user))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let user_id_router = Router::new()
        .route("/", get(get_user))
        .layer(from_fn_with_state(state.clone(), load_user_middleware));

    let inner = Router::new()
        .route("/", get(get_users))
        .route("/me", get(get_me))
        .nest("/{id}", user_id_router);

    Router::new().nest("/users", inner)
}
