use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidateEmail, ValidationError};

use super::{
    page::{Page, PageRequest, fetch_page},
    validation::{FieldErrors, ModelError},
};
use crate::entities::user;

/// Public view of an account. The API token never leaves the model layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip)]
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(length(min = 1, max = 150, message = "Username must be 1-150 characters"))]
    pub username: String,
    #[validate(custom(function = "validate_optional_email"))]
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

fn validate_optional_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() || email.validate_email() {
        Ok(())
    } else {
        Err(ValidationError::new("email").with_message("Enter a valid email address".into()))
    }
}

fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

impl User {
    fn from_model(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            is_superuser: model.is_superuser,
        }
    }

    /// Returns the user together with its freshly generated API token.
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateUser,
    ) -> Result<(Self, String), ModelError> {
        data.validate()?;
        if Self::find_by_username(db, &data.username).await?.is_some() {
            return Err(FieldErrors::single(
                "username",
                "A user with that username already exists",
            )
            .into());
        }

        let token = generate_token();
        let active = user::ActiveModel {
            username: Set(data.username.clone()),
            email: Set(data.email.clone()),
            first_name: Set(data.first_name.clone()),
            last_name: Set(data.last_name.clone()),
            api_token: Set(token.clone()),
            is_superuser: Set(data.is_superuser),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        tracing::info!("Created user '{}'", model.username);
        Ok((Self::from_model(model), token))
    }

    /// Replaces the user's API token. `None` when no such user exists.
    pub async fn rotate_token<C: ConnectionTrait>(
        db: &C,
        username: &str,
    ) -> Result<Option<String>, ModelError> {
        let Some(record) = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(db)
            .await?
        else {
            return Ok(None);
        };

        let token = generate_token();
        let mut active: user::ActiveModel = record.into();
        active.api_token = Set(token.clone());
        active.update(db).await?;
        Ok(Some(token))
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Self>, ModelError> {
        let record = user::Entity::find_by_id(id).one(db).await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_username<C: ConnectionTrait>(
        db: &C,
        username: &str,
    ) -> Result<Option<Self>, ModelError> {
        let record = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_token<C: ConnectionTrait>(
        db: &C,
        token: &str,
    ) -> Result<Option<Self>, ModelError> {
        if token.is_empty() {
            return Ok(None);
        }
        let record = user::Entity::find()
            .filter(user::Column::ApiToken.eq(token))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_page<C: ConnectionTrait>(
        db: &C,
        query: &UserQuery,
        page: PageRequest,
    ) -> Result<Page<Self>, ModelError> {
        let mut select = user::Entity::find().order_by_asc(user::Column::Username);
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(user::Column::Username.contains(search))
                    .add(user::Column::Email.contains(search)),
            );
        }
        Ok(fetch_page(db, select, page).await?.map(Self::from_model))
    }

    /// Id to username for the given ids; unknown ids are simply absent.
    pub async fn usernames<C: ConnectionTrait>(
        db: &C,
        ids: impl IntoIterator<Item = i64>,
    ) -> Result<HashMap<i64, String>, ModelError> {
        let mut ids: Vec<i64> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let records = user::Entity::find()
            .filter(user::Column::Id.is_in(ids))
            .all(db)
            .await?;
        Ok(records
            .into_iter()
            .map(|record| (record.id, record.username))
            .collect())
    }
}
