use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, Order, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionSession, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{
    history::History,
    page::{Page, PageRequest, fetch_page, parse_ordering},
    user::User,
    validation::{ModelError, blank_to_none, deserialize_some},
};
use crate::{
    entities::{project, task, task_tag},
    types::{ChangeType, TrackedEntity},
};

/// Full project form, used for detail views and `my_projects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner: i64,
    pub owner_username: String,
    pub image: Option<String>,
    pub tasks_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub id: i64,
    pub name: String,
    pub owner_username: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProject {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub image: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectQuery {
    pub owner: Option<i64>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl Project {
    async fn from_models<C: ConnectionTrait>(
        db: &C,
        models: Vec<project::Model>,
    ) -> Result<Vec<Self>, ModelError> {
        let ids: Vec<i64> = models.iter().map(|m| m.id).collect();
        let counts = Self::task_counts(db, &ids).await?;
        let usernames = User::usernames(db, models.iter().map(|m| m.owner_id)).await?;

        Ok(models
            .into_iter()
            .map(|model| Self {
                tasks_count: counts.get(&model.id).copied().unwrap_or(0),
                owner_username: usernames.get(&model.owner_id).cloned().unwrap_or_default(),
                id: model.id,
                name: model.name,
                description: model.description,
                owner: model.owner_id,
                image: model.image,
                created_at: model.created_at,
                updated_at: model.updated_at,
            })
            .collect())
    }

    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: project::Model,
    ) -> Result<Self, ModelError> {
        let mut projects = Self::from_models(db, vec![model]).await?;
        projects.pop().ok_or(ModelError::NotFound("Project"))
    }

    async fn task_counts<C: ConnectionTrait>(
        db: &C,
        project_ids: &[i64],
    ) -> Result<HashMap<i64, u64>, ModelError> {
        if project_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(i64, i64)> = task::Entity::find()
            .select_only()
            .column(task::Column::ProjectId)
            .column_as(task::Column::Id.count(), "tasks_count")
            .filter(task::Column::ProjectId.is_in(project_ids.iter().copied()))
            .group_by(task::Column::ProjectId)
            .into_tuple()
            .all(db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, count)| (id, count.max(0) as u64))
            .collect())
    }

    pub async fn find_page<C: ConnectionTrait>(
        db: &C,
        owner_id: i64,
        query: &ProjectQuery,
        page: PageRequest,
    ) -> Result<Page<ProjectSummary>, ModelError> {
        let mut select = project::Entity::find().filter(project::Column::OwnerId.eq(owner_id));
        if let Some(owner) = query.owner {
            select = select.filter(project::Column::OwnerId.eq(owner));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(project::Column::Name.contains(search))
                    .add(project::Column::Description.contains(search)),
            );
        }

        let (field, order) = parse_ordering(
            query.ordering.as_deref(),
            &["created_at", "updated_at", "name"],
            ("created_at", Order::Desc),
        );
        let column = match field {
            "updated_at" => project::Column::UpdatedAt,
            "name" => project::Column::Name,
            _ => project::Column::CreatedAt,
        };
        select = select
            .order_by(column, order)
            .order_by_desc(project::Column::Id);

        let page = fetch_page(db, select, page).await?;
        let usernames = User::usernames(db, page.results.iter().map(|m| m.owner_id)).await?;
        Ok(page.map(|model| ProjectSummary {
            owner_username: usernames.get(&model.owner_id).cloned().unwrap_or_default(),
            id: model.id,
            name: model.name,
        }))
    }

    /// Every project of `owner_id`, newest first, unpaginated.
    pub async fn find_all_for_owner<C: ConnectionTrait>(
        db: &C,
        owner_id: i64,
    ) -> Result<Vec<Self>, ModelError> {
        let models = project::Entity::find()
            .filter(project::Column::OwnerId.eq(owner_id))
            .order_by_desc(project::Column::CreatedAt)
            .order_by_desc(project::Column::Id)
            .all(db)
            .await?;
        Self::from_models(db, models).await
    }

    pub async fn find_owned<C: ConnectionTrait>(
        db: &C,
        owner_id: i64,
        id: i64,
    ) -> Result<Option<Self>, ModelError> {
        let record = project::Entity::find_by_id(id)
            .filter(project::Column::OwnerId.eq(owner_id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn create<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        owner_id: i64,
        data: &CreateProject,
    ) -> Result<Self, ModelError> {
        data.validate()?;
        let now = Utc::now();
        let txn = db.begin().await?;
        let active = project::ActiveModel {
            name: Set(data.name.clone()),
            description: Set(blank_to_none(data.description.clone())),
            owner_id: Set(owner_id),
            image: Set(blank_to_none(data.image.clone())),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Project,
            model.id,
            ChangeType::Created,
            &model,
            Some(owner_id),
        )
        .await?;
        let project = Self::from_model(&txn, model).await?;
        txn.commit().await?;
        tracing::info!("Created project {} for user {}", project.id, owner_id);
        Ok(project)
    }

    pub async fn update<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        owner_id: i64,
        id: i64,
        data: &UpdateProject,
    ) -> Result<Self, ModelError> {
        let txn = db.begin().await?;
        let record = project::Entity::find_by_id(id)
            .filter(project::Column::OwnerId.eq(owner_id))
            .one(&txn)
            .await?
            .ok_or(ModelError::NotFound("Project"))?;

        let merged = CreateProject {
            name: data.name.clone().unwrap_or_else(|| record.name.clone()),
            description: match &data.description {
                Some(description) => description.clone(),
                None => record.description.clone(),
            },
            image: match &data.image {
                Some(image) => image.clone(),
                None => record.image.clone(),
            },
        };
        merged.validate()?;

        let mut active: project::ActiveModel = record.into();
        active.name = Set(merged.name);
        active.description = Set(blank_to_none(merged.description));
        active.image = Set(blank_to_none(merged.image));
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Project,
            model.id,
            ChangeType::Updated,
            &model,
            Some(owner_id),
        )
        .await?;
        let project = Self::from_model(&txn, model).await?;
        txn.commit().await?;
        Ok(project)
    }

    /// Removes the project together with its tasks, recording each removal.
    pub async fn delete<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        owner_id: i64,
        id: i64,
    ) -> Result<(), ModelError> {
        let txn = db.begin().await?;
        let record = project::Entity::find_by_id(id)
            .filter(project::Column::OwnerId.eq(owner_id))
            .one(&txn)
            .await?
            .ok_or(ModelError::NotFound("Project"))?;

        let tasks = task::Entity::find()
            .filter(task::Column::ProjectId.eq(id))
            .all(&txn)
            .await?;
        if !tasks.is_empty() {
            let task_ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
            task_tag::Entity::delete_many()
                .filter(task_tag::Column::TaskId.is_in(task_ids))
                .exec(&txn)
                .await?;
            task::Entity::delete_many()
                .filter(task::Column::ProjectId.eq(id))
                .exec(&txn)
                .await?;
            for task in &tasks {
                History::record(
                    &txn,
                    TrackedEntity::Task,
                    task.id,
                    ChangeType::Deleted,
                    task,
                    Some(owner_id),
                )
                .await?;
            }
        }

        project::Entity::delete_by_id(id).exec(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Project,
            id,
            ChangeType::Deleted,
            &record,
            Some(owner_id),
        )
        .await?;
        txn.commit().await?;
        tracing::info!("Deleted project {} with {} task(s)", id, tasks.len());
        Ok(())
    }
}
