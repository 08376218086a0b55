use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionSession, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{
    history::History,
    page::{Page, PageRequest, fetch_page},
    user::User,
    validation::{FieldErrors, ModelError, validate_hex_color},
};
use crate::{
    entities::{tag, task_tag},
    types::{ChangeType, TrackedEntity},
};

const DEFAULT_COLOR: &str = "#007bff";

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

/// A label private to the user who created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
    #[serde(skip)]
    pub user_id: i64,
    pub user_username: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTag {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: String,
    #[validate(custom(function = "validate_hex_color"))]
    #[serde(default = "default_color")]
    pub color: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTag {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagQuery {
    pub color: Option<String>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl Tag {
    pub(crate) fn from_model(model: tag::Model, user_username: String) -> Self {
        Self {
            id: model.id,
            name: model.name,
            color: model.color,
            user_id: model.user_id,
            user_username,
        }
    }

    async fn with_owner<C: ConnectionTrait>(db: &C, model: tag::Model) -> Result<Self, ModelError> {
        let username = User::usernames(db, [model.user_id])
            .await?
            .remove(&model.user_id)
            .unwrap_or_default();
        Ok(Self::from_model(model, username))
    }

    pub async fn find_page<C: ConnectionTrait>(
        db: &C,
        owner_id: i64,
        query: &TagQuery,
        page: PageRequest,
    ) -> Result<Page<Self>, ModelError> {
        let mut select = tag::Entity::find()
            .filter(tag::Column::UserId.eq(owner_id))
            .order_by_asc(tag::Column::Name);
        if let Some(color) = query.color.as_deref().filter(|c| !c.is_empty()) {
            select = select.filter(tag::Column::Color.eq(color));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            select = select.filter(tag::Column::Name.contains(search));
        }
        let username = User::usernames(db, [owner_id])
            .await?
            .remove(&owner_id)
            .unwrap_or_default();
        Ok(fetch_page(db, select, page)
            .await?
            .map(|model| Self::from_model(model, username.clone())))
    }

    /// Another user's tag is treated as missing.
    pub async fn find_owned<C: ConnectionTrait>(
        db: &C,
        owner_id: i64,
        id: i64,
    ) -> Result<Option<Self>, ModelError> {
        let record = tag::Entity::find_by_id(id)
            .filter(tag::Column::UserId.eq(owner_id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::with_owner(db, model).await?)),
            None => Ok(None),
        }
    }

    /// Tags linked to each of `task_ids`, by name.
    pub async fn for_tasks<C: ConnectionTrait>(
        db: &C,
        task_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Self>>, ModelError> {
        if task_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let links = task_tag::Entity::find()
            .filter(task_tag::Column::TaskId.is_in(task_ids.iter().copied()))
            .all(db)
            .await?;
        let tags: HashMap<i64, tag::Model> = tag::Entity::find()
            .filter(tag::Column::Id.is_in(links.iter().map(|link| link.tag_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|model| (model.id, model))
            .collect();
        let usernames = User::usernames(db, tags.values().map(|model| model.user_id)).await?;

        let mut by_task: HashMap<i64, Vec<Self>> = HashMap::new();
        for link in links {
            if let Some(model) = tags.get(&link.tag_id) {
                by_task
                    .entry(link.task_id)
                    .or_default()
                    .push(Self::from_model(
                        model.clone(),
                        usernames.get(&model.user_id).cloned().unwrap_or_default(),
                    ));
            }
        }
        for tags in by_task.values_mut() {
            tags.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(by_task)
    }

    async fn check_unique<C: ConnectionTrait>(
        db: &C,
        owner_id: i64,
        name: &str,
        exclude: Option<i64>,
    ) -> Result<(), ModelError> {
        let mut select = tag::Entity::find()
            .filter(tag::Column::UserId.eq(owner_id))
            .filter(tag::Column::Name.eq(name));
        if let Some(id) = exclude {
            select = select.filter(tag::Column::Id.ne(id));
        }
        if select.one(db).await?.is_some() {
            return Err(FieldErrors::single("name", "You already have a tag with this name").into());
        }
        Ok(())
    }

    pub async fn create<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        owner_id: i64,
        data: &CreateTag,
    ) -> Result<Self, ModelError> {
        data.validate()?;
        let txn = db.begin().await?;
        Self::check_unique(&txn, owner_id, &data.name, None).await?;

        let active = tag::ActiveModel {
            name: Set(data.name.clone()),
            color: Set(data.color.clone()),
            user_id: Set(owner_id),
            ..Default::default()
        };
        let model = active.insert(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Tag,
            model.id,
            ChangeType::Created,
            &model,
            Some(owner_id),
        )
        .await?;
        let tag = Self::with_owner(&txn, model).await?;
        txn.commit().await?;
        Ok(tag)
    }

    pub async fn update<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        owner_id: i64,
        id: i64,
        data: &UpdateTag,
    ) -> Result<Self, ModelError> {
        let txn = db.begin().await?;
        let record = tag::Entity::find_by_id(id)
            .filter(tag::Column::UserId.eq(owner_id))
            .one(&txn)
            .await?
            .ok_or(ModelError::NotFound("Tag"))?;

        let merged = CreateTag {
            name: data.name.clone().unwrap_or_else(|| record.name.clone()),
            color: data.color.clone().unwrap_or_else(|| record.color.clone()),
        };
        merged.validate()?;
        Self::check_unique(&txn, owner_id, &merged.name, Some(id)).await?;

        let mut active: tag::ActiveModel = record.into();
        active.name = Set(merged.name);
        active.color = Set(merged.color);
        let model = active.update(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Tag,
            model.id,
            ChangeType::Updated,
            &model,
            Some(owner_id),
        )
        .await?;
        let tag = Self::with_owner(&txn, model).await?;
        txn.commit().await?;
        Ok(tag)
    }

    pub async fn delete<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        owner_id: i64,
        id: i64,
    ) -> Result<(), ModelError> {
        let txn = db.begin().await?;
        let record = tag::Entity::find_by_id(id)
            .filter(tag::Column::UserId.eq(owner_id))
            .one(&txn)
            .await?
            .ok_or(ModelError::NotFound("Tag"))?;

        task_tag::Entity::delete_many()
            .filter(task_tag::Column::TagId.eq(id))
            .exec(&txn)
            .await?;
        tag::Entity::delete_by_id(id).exec(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Tag,
            id,
            ChangeType::Deleted,
            &record,
            Some(owner_id),
        )
        .await?;
        txn.commit().await?;
        Ok(())
    }
}
