use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::trace::TraceLayer;

use crate::{routes, state::AppState};

pub mod auth;

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(routes::priorities::router(&state))
        .merge(routes::statuses::router(&state))
        .merge(routes::tags::router(&state))
        .merge(routes::projects::router(&state))
        .merge(routes::tasks::router(&state))
        .merge(routes::users::router(&state))
        .layer(from_fn_with_state(state.clone(), auth::require_api_auth));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
