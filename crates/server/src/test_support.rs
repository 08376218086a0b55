use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use db::{
    DBService,
    models::user::{CreateUser, User},
};
use serde_json::Value;
use tower::ServiceExt;

use crate::{config::AppConfig, http, state::AppState};

/// Router over a fresh in-memory database with one authenticated user.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub user: User,
    pub token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = DBService::new_in_memory().await.unwrap();
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            page_size: 10,
        };
        let state = AppState::new(db, config);
        let router = http::router(state.clone());
        let (user, token) = create_user(&state, "alice").await;

        Self {
            state,
            router,
            user,
            token,
        }
    }

    pub async fn add_user(&self, username: &str) -> (User, String) {
        create_user(&self.state, username).await
    }

    /// Sends a request as the default user.
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send_as(Some(self.token.as_str()), method, uri, body).await
    }

    pub async fn send_as(
        &self,
        token: Option<&str>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

async fn create_user(state: &AppState, username: &str) -> (User, String) {
    User::create(
        &state.db().pool,
        &CreateUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            first_name: String::new(),
            last_name: String::new(),
            is_superuser: false,
        },
    )
    .await
    .unwrap()
}
