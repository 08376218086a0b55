use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use db::models::user::User;
use utils::response::ApiResponse;

use crate::state::AppState;

/// The authenticated account, inserted into request extensions by
/// [`require_api_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.0.id
    }
}

fn parse_authorization_bearer(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    let (prefix, rest) = trimmed.split_once(' ')?;
    if !prefix.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

fn extract_request_token(req: &Request) -> Option<String> {
    // 1) Authorization: Bearer <token>
    if let Some(value) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_authorization_bearer)
    {
        return Some(value.to_string());
    }

    // 2) X-API-Token: <token>
    req.headers()
        .get("x-api-token")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn unauthorized() -> Response {
    let response = ApiResponse::<()>::error("Unauthorized");
    (StatusCode::UNAUTHORIZED, Json(response)).into_response()
}

pub async fn require_api_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let presented = extract_request_token(&req);
    let user = match presented.as_deref() {
        Some(token) => match User::find_by_token(&state.db().pool, token).await {
            Ok(user) => user,
            Err(err) => {
                tracing::error!("Failed to resolve API token: {err}");
                let response = ApiResponse::<()>::error("Internal server error");
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response();
            }
        },
        None => None,
    };

    let Some(user) = user else {
        let reason = if presented.is_none() {
            "missing_token"
        } else {
            "unknown_token"
        };
        tracing::warn!(
            path = %req.uri().path(),
            method = %req.method(),
            reason,
            "Unauthorized API request"
        );
        return unauthorized();
    };

    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::parse_authorization_bearer;

    #[test]
    fn bearer_prefix_is_case_insensitive() {
        assert_eq!(parse_authorization_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_authorization_bearer("bearer   abc  "), Some("abc"));
        assert_eq!(parse_authorization_bearer("Basic abc"), None);
        assert_eq!(parse_authorization_bearer("Bearer "), None);
    }
}
