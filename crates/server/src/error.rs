use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::{
    DbErr,
    models::validation::{FieldErrors, ModelError},
};
use sea_orm::SqlErr;
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

fn database_status(err: &DbErr) -> (StatusCode, &'static str) {
    match err {
        DbErr::RecordNotFound(_) => (StatusCode::NOT_FOUND, "DatabaseError"),
        // A concurrent write slipped past the model-level uniqueness checks.
        _ if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            (StatusCode::BAD_REQUEST, "UniqueViolation")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = match &self {
            ApiError::Model(err) => match err {
                ModelError::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
                ModelError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
                ModelError::Database(db_err) => database_status(db_err),
            },
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error_type,
                error = %self,
                "API request failed"
            );
        }

        if let ApiError::Model(ModelError::Validation(errors)) = self {
            let response =
                ApiResponse::<(), FieldErrors>::error_with_data("Validation failed", errors);
            return (status_code, Json(response)).into_response();
        }

        let error_message = match &self {
            ApiError::Model(ModelError::NotFound(name)) => format!("{name} not found"),
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
            _ if status_code == StatusCode::BAD_REQUEST => {
                "A record with these values already exists".to_string()
            }
            _ => format!("{}: {}", error_type, self),
        };
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}
