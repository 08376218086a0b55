use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, JoinType, Order,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, Set, TransactionSession, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{
    history::History,
    page::{Page, PageRequest, fetch_page, parse_ordering},
    priority::Priority,
    status::Status,
    tag::Tag,
    task_filters,
    user::User,
    validation::{
        FieldErrors, ModelError, blank_to_none, deserialize_date_or_datetime, deserialize_some,
    },
};
use crate::{
    entities::{priority, project, status, tag, task, task_tag, user},
    types::{ChangeType, TrackedEntity},
};

/// Shown as `changed_by` when a history record has no actor.
pub const SYSTEM_ACTOR: &str = "system";

/// Full task form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDetail {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub project: i64,
    pub project_name: String,
    pub priority: Option<i64>,
    pub priority_name: Option<String>,
    pub priority_details: Option<Priority>,
    pub status: Option<i64>,
    pub status_name: Option<String>,
    pub status_details: Option<Status>,
    pub assigned_to: Option<i64>,
    pub assigned_to_username: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub tags: Vec<i64>,
    pub tags_list: Vec<Tag>,
    pub tags_details: Vec<Tag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<i64>,
    pub created_by_username: Option<String>,
}

/// Compact list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub id: i64,
    pub title: String,
    pub project_name: String,
    pub status_name: Option<String>,
    pub priority_name: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueTasks {
    pub count: usize,
    pub tasks: Vec<TaskDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub message: String,
    pub task: TaskDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskHistoryEntry {
    pub id: i64,
    pub title: String,
    pub status: Option<String>,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
    pub change_type: ChangeType,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTask {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    pub description: Option<String>,
    pub project: i64,
    pub priority: Option<i64>,
    pub status: Option<i64>,
    pub assigned_to: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
    pub image: Option<String>,
    #[serde(default)]
    pub tags: Vec<i64>,
}

/// Partial update. For nullable fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    pub project: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub priority: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub status: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub assigned_to: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub image: Option<Option<String>>,
    pub tags: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskQuery {
    pub status: Option<i64>,
    pub priority: Option<i64>,
    pub project: Option<i64>,
    pub assigned_to: Option<i64>,
    pub priority_level: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_date_or_datetime")]
    pub due_date_from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_date_or_datetime")]
    pub due_date_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// Column values for an insert that skips request validation. Used by seeding.
#[derive(Debug, Clone)]
pub(crate) struct NewTaskRecord {
    pub title: String,
    pub description: Option<String>,
    pub project_id: i64,
    pub priority_id: Option<i64>,
    pub status_id: Option<i64>,
    pub assigned_to_id: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_by_id: Option<i64>,
    pub tag_ids: Vec<i64>,
}

/// The subset of a task snapshot the history view needs.
#[derive(Debug, Deserialize)]
struct TaskSnapshot {
    #[serde(default)]
    title: String,
    #[serde(default)]
    status_id: Option<i64>,
}

/// Title, project and due date as they will be after a write, plus the
/// references the request actually touches.
struct WriteCheck<'a> {
    title: &'a str,
    project_id: i64,
    project_changed: bool,
    priority_id: Option<i64>,
    status_id: Option<i64>,
    assigned_to_id: Option<i64>,
    due_date: Option<DateTime<Utc>>,
    tag_ids: Option<&'a [i64]>,
    exclude: Option<i64>,
}

impl TaskDetail {
    async fn from_models<C: ConnectionTrait>(
        db: &C,
        models: Vec<task::Model>,
    ) -> Result<Vec<Self>, ModelError> {
        if models.is_empty() {
            return Ok(Vec::new());
        }
        let lookups = Lookups::load(db, &models).await?;
        let task_ids: Vec<i64> = models.iter().map(|m| m.id).collect();
        let mut tags = Tag::for_tasks(db, &task_ids).await?;

        Ok(models
            .into_iter()
            .map(|model| {
                let priority = model
                    .priority_id
                    .and_then(|id| lookups.priorities.get(&id).cloned());
                let status = model
                    .status_id
                    .and_then(|id| lookups.statuses.get(&id).cloned());
                let tags_details = tags.remove(&model.id).unwrap_or_default();
                Self {
                    id: model.id,
                    title: model.title,
                    description: model.description,
                    project: model.project_id,
                    project_name: lookups.project_name(model.project_id),
                    priority: model.priority_id,
                    priority_name: priority.as_ref().map(|p| p.name.clone()),
                    priority_details: priority,
                    status: model.status_id,
                    status_name: status.as_ref().map(|s| s.name.clone()),
                    status_details: status,
                    assigned_to: model.assigned_to_id,
                    assigned_to_username: lookups.username(model.assigned_to_id),
                    due_date: model.due_date,
                    image: model.image,
                    tags: tags_details.iter().map(|t| t.id).collect(),
                    tags_list: tags_details.clone(),
                    tags_details,
                    created_at: model.created_at,
                    updated_at: model.updated_at,
                    created_by: model.created_by_id,
                    created_by_username: lookups.username(model.created_by_id),
                }
            })
            .collect())
    }

    async fn from_model<C: ConnectionTrait>(db: &C, model: task::Model) -> Result<Self, ModelError> {
        let mut details = Self::from_models(db, vec![model]).await?;
        details.pop().ok_or(ModelError::NotFound("Task"))
    }
}

/// Names referenced by a batch of tasks, loaded in one query per table.
struct Lookups {
    projects: HashMap<i64, String>,
    priorities: HashMap<i64, Priority>,
    statuses: HashMap<i64, Status>,
    usernames: HashMap<i64, String>,
}

impl Lookups {
    async fn load<C: ConnectionTrait>(db: &C, models: &[task::Model]) -> Result<Self, ModelError> {
        let project_ids: HashSet<i64> = models.iter().map(|m| m.project_id).collect();
        let priority_ids: HashSet<i64> = models.iter().filter_map(|m| m.priority_id).collect();
        let status_ids: HashSet<i64> = models.iter().filter_map(|m| m.status_id).collect();
        let user_ids: Vec<i64> = models
            .iter()
            .flat_map(|m| [m.assigned_to_id, m.created_by_id])
            .flatten()
            .collect();

        let projects = project::Entity::find()
            .filter(project::Column::Id.is_in(project_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();
        let priorities = if priority_ids.is_empty() {
            HashMap::new()
        } else {
            priority::Entity::find()
                .filter(priority::Column::Id.is_in(priority_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|p| (p.id, Priority::from_model(p)))
                .collect()
        };
        let statuses = if status_ids.is_empty() {
            HashMap::new()
        } else {
            status::Entity::find()
                .filter(status::Column::Id.is_in(status_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|s| (s.id, Status::from_model(s)))
                .collect()
        };
        let usernames = User::usernames(db, user_ids).await?;

        Ok(Self {
            projects,
            priorities,
            statuses,
            usernames,
        })
    }

    fn project_name(&self, id: i64) -> String {
        self.projects.get(&id).cloned().unwrap_or_default()
    }

    fn username(&self, id: Option<i64>) -> Option<String> {
        id.and_then(|id| self.usernames.get(&id).cloned())
    }
}

pub struct Task;

impl Task {
    fn visible(user_id: i64) -> Select<task::Entity> {
        task::Entity::find().filter(task_filters::visible_to(user_id))
    }

    fn newest_first(select: Select<task::Entity>) -> Select<task::Entity> {
        select
            .order_by_desc(task::Column::CreatedAt)
            .order_by_desc(task::Column::Id)
    }

    async fn find_visible_model<C: ConnectionTrait>(
        db: &C,
        user_id: i64,
        id: i64,
    ) -> Result<Option<task::Model>, ModelError> {
        Ok(Self::visible(user_id)
            .filter(task::Column::Id.eq(id))
            .one(db)
            .await?)
    }

    pub async fn find_page<C: ConnectionTrait>(
        db: &C,
        user_id: i64,
        query: &TaskQuery,
        page: PageRequest,
    ) -> Result<Page<TaskSummary>, ModelError> {
        let mut condition = Condition::all();
        if let Some(status) = query.status {
            condition = condition.add(task::Column::StatusId.eq(status));
        }
        if let Some(priority) = query.priority {
            condition = condition.add(task::Column::PriorityId.eq(priority));
        }
        if let Some(project) = query.project {
            condition = condition.add(task::Column::ProjectId.eq(project));
        }
        if let Some(assigned_to) = query.assigned_to {
            condition = condition.add(task::Column::AssignedToId.eq(assigned_to));
        }
        if let Some(level) = query.priority_level {
            condition = condition.add(task_filters::with_priority_level(level));
        }
        if let Some(from) = query.due_date_from {
            condition = condition.add(task::Column::DueDate.gte(from));
        }
        if let Some(to) = query.due_date_to {
            condition = condition.add(task::Column::DueDate.lte(to));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            condition = condition.add(
                Condition::any()
                    .add(task::Column::Title.contains(search))
                    .add(task::Column::Description.contains(search)),
            );
        }

        let mut select = Self::visible(user_id).filter(condition);
        let (field, order) = parse_ordering(
            query.ordering.as_deref(),
            &["created_at", "due_date", "priority__level"],
            ("created_at", Order::Desc),
        );
        select = match field {
            "due_date" => select.order_by(task::Column::DueDate, order),
            "priority__level" => select
                .join(JoinType::LeftJoin, task::Relation::Priority.def())
                .order_by(priority::Column::Level, order),
            _ => select.order_by(task::Column::CreatedAt, order),
        };
        select = select.order_by_desc(task::Column::Id);

        let page = fetch_page(db, select, page).await?;
        let lookups = Lookups::load(db, &page.results).await?;
        Ok(page.map(|model| TaskSummary {
            project_name: lookups.project_name(model.project_id),
            status_name: model
                .status_id
                .and_then(|id| lookups.statuses.get(&id))
                .map(|s| s.name.clone()),
            priority_name: model
                .priority_id
                .and_then(|id| lookups.priorities.get(&id))
                .map(|p| p.name.clone()),
            id: model.id,
            title: model.title,
            due_date: model.due_date,
            created_at: model.created_at,
        }))
    }

    pub async fn find_visible<C: ConnectionTrait>(
        db: &C,
        user_id: i64,
        id: i64,
    ) -> Result<Option<TaskDetail>, ModelError> {
        match Self::find_visible_model(db, user_id, id).await? {
            Some(model) => Ok(Some(TaskDetail::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    async fn find_matching<C: ConnectionTrait>(
        db: &C,
        select: Select<task::Entity>,
    ) -> Result<Vec<TaskDetail>, ModelError> {
        let models = Self::newest_first(select).all(db).await?;
        TaskDetail::from_models(db, models).await
    }

    pub async fn upcoming_week<C: ConnectionTrait>(
        db: &C,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskDetail>, ModelError> {
        let select = Self::visible(user_id).filter(task_filters::upcoming_week(now));
        Self::find_matching(db, select).await
    }

    pub async fn overdue<C: ConnectionTrait>(
        db: &C,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<OverdueTasks, ModelError> {
        let select = Self::visible(user_id).filter(task_filters::overdue(now));
        let tasks = Self::find_matching(db, select).await?;
        Ok(OverdueTasks {
            count: tasks.len(),
            tasks,
        })
    }

    pub async fn urgent_or_tomorrow<C: ConnectionTrait>(
        db: &C,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskDetail>, ModelError> {
        let select = Self::visible(user_id).filter(task_filters::urgent_or_tomorrow(now));
        Self::find_matching(db, select).await
    }

    /// Not restricted to visible tasks.
    pub async fn others_in_progress_or_cancelled<C: ConnectionTrait>(
        db: &C,
        user_id: i64,
    ) -> Result<Vec<TaskDetail>, ModelError> {
        let select =
            task::Entity::find().filter(task_filters::others_in_progress_or_cancelled(user_id));
        Self::find_matching(db, select).await
    }

    pub async fn history<C: ConnectionTrait>(
        db: &C,
        user_id: i64,
        id: i64,
    ) -> Result<Vec<TaskHistoryEntry>, ModelError> {
        if Self::find_visible_model(db, user_id, id).await?.is_none() {
            return Err(ModelError::NotFound("Task"));
        }

        let records = History::for_entity(db, TrackedEntity::Task, id).await?;
        let snapshots: Vec<TaskSnapshot> = records
            .iter()
            .map(|record| {
                serde_json::from_value(record.snapshot.clone()).unwrap_or_else(|err| {
                    tracing::warn!(
                        "History record {} for task {id} has an unreadable snapshot: {err}",
                        record.id
                    );
                    TaskSnapshot {
                        title: String::new(),
                        status_id: None,
                    }
                })
            })
            .collect();

        let status_ids: HashSet<i64> = snapshots.iter().filter_map(|s| s.status_id).collect();
        let status_names: HashMap<i64, String> = if status_ids.is_empty() {
            HashMap::new()
        } else {
            status::Entity::find()
                .filter(status::Column::Id.is_in(status_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|s| (s.id, s.name))
                .collect()
        };
        let usernames = User::usernames(db, records.iter().filter_map(|r| r.changed_by_id)).await?;

        Ok(records
            .into_iter()
            .zip(snapshots)
            .map(|(record, snapshot)| TaskHistoryEntry {
                id: record.id,
                title: snapshot.title,
                status: snapshot
                    .status_id
                    .and_then(|id| status_names.get(&id).cloned()),
                changed_at: record.changed_at,
                changed_by: record
                    .changed_by_id
                    .and_then(|id| usernames.get(&id).cloned())
                    .unwrap_or_else(|| SYSTEM_ACTOR.to_string()),
                change_type: record.change_type,
            })
            .collect())
    }

    async fn check_write<C: ConnectionTrait>(
        db: &C,
        user_id: i64,
        check: WriteCheck<'_>,
        now: DateTime<Utc>,
    ) -> Result<(), ModelError> {
        let mut errors = FieldErrors::new();

        if check.title.is_empty() || check.title.chars().count() > 200 {
            errors.add("title", "Title must be 1-200 characters");
        }
        if let Some(due_date) = check.due_date
            && due_date < now
        {
            errors.add("due_date", "Due date cannot be in the past");
        }

        let project = project::Entity::find_by_id(check.project_id).one(db).await?;
        match project {
            None => errors.add("project", "Project not found"),
            Some(project) if check.project_changed && project.owner_id != user_id => {
                errors.add("project", "You can only add tasks to your own projects")
            }
            Some(_) => {}
        }
        if let Some(id) = check.priority_id
            && priority::Entity::find_by_id(id).one(db).await?.is_none()
        {
            errors.add("priority", "Priority not found");
        }
        if let Some(id) = check.status_id
            && status::Entity::find_by_id(id).one(db).await?.is_none()
        {
            errors.add("status", "Status not found");
        }
        if let Some(id) = check.assigned_to_id
            && user::Entity::find_by_id(id).one(db).await?.is_none()
        {
            errors.add("assigned_to", "User not found");
        }
        if let Some(tag_ids) = check.tag_ids.filter(|ids| !ids.is_empty()) {
            let wanted: HashSet<i64> = tag_ids.iter().copied().collect();
            let owned = tag::Entity::find()
                .filter(tag::Column::Id.is_in(wanted.iter().copied()))
                .filter(tag::Column::UserId.eq(user_id))
                .all(db)
                .await?;
            if owned.len() != wanted.len() {
                errors.add("tags", "Tags must exist and belong to you");
            }
        }

        let mut duplicate = task::Entity::find()
            .filter(task::Column::ProjectId.eq(check.project_id))
            .filter(task::Column::Title.eq(check.title));
        if let Some(id) = check.exclude {
            duplicate = duplicate.filter(task::Column::Id.ne(id));
        }
        if duplicate.one(db).await?.is_some() {
            errors.add("title", "A task with this title already exists in this project");
        }

        errors.into_result()
    }

    async fn replace_tags<C: ConnectionTrait>(
        db: &C,
        task_id: i64,
        tag_ids: &[i64],
    ) -> Result<(), ModelError> {
        task_tag::Entity::delete_many()
            .filter(task_tag::Column::TaskId.eq(task_id))
            .exec(db)
            .await?;
        let unique: HashSet<i64> = tag_ids.iter().copied().collect();
        if unique.is_empty() {
            return Ok(());
        }
        let links = unique.into_iter().map(|tag_id| task_tag::ActiveModel {
            task_id: Set(task_id),
            tag_id: Set(tag_id),
        });
        task_tag::Entity::insert_many(links)
            .exec_without_returning(db)
            .await?;
        Ok(())
    }

    pub(crate) async fn insert_record<C: ConnectionTrait>(
        db: &C,
        record: NewTaskRecord,
    ) -> Result<task::Model, ModelError> {
        let now = Utc::now();
        let active = task::ActiveModel {
            title: Set(record.title),
            description: Set(blank_to_none(record.description)),
            project_id: Set(record.project_id),
            priority_id: Set(record.priority_id),
            status_id: Set(record.status_id),
            assigned_to_id: Set(record.assigned_to_id),
            due_date: Set(record.due_date),
            image: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            created_by_id: Set(record.created_by_id),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Self::replace_tags(db, model.id, &record.tag_ids).await?;
        History::record(
            db,
            TrackedEntity::Task,
            model.id,
            ChangeType::Created,
            &model,
            record.created_by_id,
        )
        .await?;
        Ok(model)
    }

    pub async fn create<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        user_id: i64,
        data: &CreateTask,
    ) -> Result<TaskDetail, ModelError> {
        data.validate()?;
        let txn = db.begin().await?;
        Self::check_write(
            &txn,
            user_id,
            WriteCheck {
                title: &data.title,
                project_id: data.project,
                project_changed: true,
                priority_id: data.priority,
                status_id: data.status,
                assigned_to_id: data.assigned_to,
                due_date: data.due_date,
                tag_ids: Some(data.tags.as_slice()),
                exclude: None,
            },
            Utc::now(),
        )
        .await?;

        let now = Utc::now();
        let active = task::ActiveModel {
            title: Set(data.title.clone()),
            description: Set(blank_to_none(data.description.clone())),
            project_id: Set(data.project),
            priority_id: Set(data.priority),
            status_id: Set(data.status),
            assigned_to_id: Set(data.assigned_to),
            due_date: Set(data.due_date),
            image: Set(blank_to_none(data.image.clone())),
            created_at: Set(now),
            updated_at: Set(now),
            created_by_id: Set(Some(user_id)),
            ..Default::default()
        };
        let model = active.insert(&txn).await?;
        Self::replace_tags(&txn, model.id, &data.tags).await?;
        History::record(
            &txn,
            TrackedEntity::Task,
            model.id,
            ChangeType::Created,
            &model,
            Some(user_id),
        )
        .await?;
        let detail = TaskDetail::from_model(&txn, model).await?;
        txn.commit().await?;
        tracing::info!("User {} created task {}", user_id, detail.id);
        Ok(detail)
    }

    pub async fn update<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        user_id: i64,
        id: i64,
        data: &UpdateTask,
    ) -> Result<TaskDetail, ModelError> {
        let txn = db.begin().await?;
        let record = Self::find_visible_model(&txn, user_id, id)
            .await?
            .ok_or(ModelError::NotFound("Task"))?;

        let title = data.title.clone().unwrap_or_else(|| record.title.clone());
        let project_id = data.project.unwrap_or(record.project_id);
        let priority_id = data.priority.unwrap_or(record.priority_id);
        let status_id = data.status.unwrap_or(record.status_id);
        let assigned_to_id = data.assigned_to.unwrap_or(record.assigned_to_id);
        let due_date = data.due_date.unwrap_or(record.due_date);

        // Only references the request sets are re-checked, so an existing
        // past due date does not block unrelated edits.
        Self::check_write(
            &txn,
            user_id,
            WriteCheck {
                title: &title,
                project_id,
                project_changed: project_id != record.project_id,
                priority_id: data.priority.flatten(),
                status_id: data.status.flatten(),
                assigned_to_id: data.assigned_to.flatten(),
                due_date: data.due_date.flatten(),
                tag_ids: data.tags.as_deref(),
                exclude: Some(id),
            },
            Utc::now(),
        )
        .await?;

        let mut active: task::ActiveModel = record.clone().into();
        active.title = Set(title);
        if let Some(description) = &data.description {
            active.description = Set(blank_to_none(description.clone()));
        }
        active.project_id = Set(project_id);
        active.priority_id = Set(priority_id);
        active.status_id = Set(status_id);
        active.assigned_to_id = Set(assigned_to_id);
        active.due_date = Set(due_date);
        if let Some(image) = &data.image {
            active.image = Set(blank_to_none(image.clone()));
        }
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;
        if let Some(tag_ids) = &data.tags {
            Self::replace_tags(&txn, id, tag_ids).await?;
        }
        History::record(
            &txn,
            TrackedEntity::Task,
            id,
            ChangeType::Updated,
            &model,
            Some(user_id),
        )
        .await?;
        let detail = TaskDetail::from_model(&txn, model).await?;
        txn.commit().await?;
        Ok(detail)
    }

    pub async fn change_status<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        user_id: i64,
        id: i64,
        status_id: Option<i64>,
    ) -> Result<StatusChange, ModelError> {
        let txn = db.begin().await?;
        let record = Self::find_visible_model(&txn, user_id, id)
            .await?
            .ok_or(ModelError::NotFound("Task"))?;
        let Some(status_id) = status_id else {
            return Err(FieldErrors::single("status_id", "status_id is required").into());
        };
        let status = status::Entity::find_by_id(status_id)
            .one(&txn)
            .await?
            .ok_or(ModelError::NotFound("Status"))?;

        let mut active: task::ActiveModel = record.into();
        active.status_id = Set(Some(status.id));
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Task,
            id,
            ChangeType::Updated,
            &model,
            Some(user_id),
        )
        .await?;
        let task = TaskDetail::from_model(&txn, model).await?;
        txn.commit().await?;
        Ok(StatusChange {
            message: format!("Task status changed to \"{}\"", status.name),
            task,
        })
    }

    pub async fn delete<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        user_id: i64,
        id: i64,
    ) -> Result<(), ModelError> {
        let txn = db.begin().await?;
        let record = Self::find_visible_model(&txn, user_id, id)
            .await?
            .ok_or(ModelError::NotFound("Task"))?;

        task_tag::Entity::delete_many()
            .filter(task_tag::Column::TaskId.eq(id))
            .exec(&txn)
            .await?;
        task::Entity::delete_by_id(id).exec(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Task,
            id,
            ChangeType::Deleted,
            &record,
            Some(user_id),
        )
        .await?;
        txn.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{
        models::{
            priority::CreatePriority,
            project::{CreateProject, Project},
            status::{CANCELLED, COMPLETED, CreateStatus, IN_PROGRESS},
            tag::CreateTag,
        },
        test_utils::{create_user, setup_db},
    };

    struct Fixture {
        db: crate::DbPool,
        owner: User,
        project: Project,
        high: Priority,
        low: Priority,
        open: Status,
        done: Status,
    }

    async fn fixture() -> Fixture {
        let db = setup_db().await;
        let owner = create_user(&db, "owner").await;
        let project = Project::create(
            &db,
            owner.id,
            &CreateProject {
                name: "Website".to_string(),
                description: None,
                image: None,
            },
        )
        .await
        .unwrap();
        let high = Priority::create(
            &db,
            &CreatePriority {
                name: "High".to_string(),
                level: 4,
            },
            None,
        )
        .await
        .unwrap();
        let low = Priority::create(
            &db,
            &CreatePriority {
                name: "Low".to_string(),
                level: 1,
            },
            None,
        )
        .await
        .unwrap();
        let open = Status::create(
            &db,
            &CreateStatus {
                name: IN_PROGRESS.to_string(),
                color: "#007bff".to_string(),
            },
            None,
        )
        .await
        .unwrap();
        let done = Status::create(
            &db,
            &CreateStatus {
                name: COMPLETED.to_string(),
                color: "#28a745".to_string(),
            },
            None,
        )
        .await
        .unwrap();
        Fixture {
            db,
            owner,
            project,
            high,
            low,
            open,
            done,
        }
    }

    impl Fixture {
        fn new_task(&self, title: &str) -> CreateTask {
            CreateTask {
                title: title.to_string(),
                description: None,
                project: self.project.id,
                priority: None,
                status: None,
                assigned_to: None,
                due_date: None,
                image: None,
                tags: Vec::new(),
            }
        }

        /// Inserts directly so due dates in the past are allowed.
        async fn insert(
            &self,
            title: &str,
            due_date: Option<DateTime<Utc>>,
            priority: Option<&Priority>,
            status: Option<&Status>,
            created_by: Option<i64>,
        ) -> task::Model {
            Task::insert_record(
                &self.db,
                NewTaskRecord {
                    title: title.to_string(),
                    description: None,
                    project_id: self.project.id,
                    priority_id: priority.map(|p| p.id),
                    status_id: status.map(|s| s.id),
                    assigned_to_id: None,
                    due_date,
                    created_by_id: created_by,
                    tag_ids: Vec::new(),
                },
            )
            .await
            .unwrap()
        }
    }

    fn titles(tasks: &[TaskDetail]) -> Vec<&str> {
        let mut titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        titles.sort_unstable();
        titles
    }

    #[tokio::test]
    async fn create_stamps_creator_and_expands_references() {
        let f = fixture().await;
        let tag = Tag::create(
            &f.db,
            f.owner.id,
            &CreateTag {
                name: "work".to_string(),
                color: "#007bff".to_string(),
            },
        )
        .await
        .unwrap();
        let mut data = f.new_task("Design page");
        data.priority = Some(f.high.id);
        data.status = Some(f.open.id);
        data.assigned_to = Some(f.owner.id);
        data.tags = vec![tag.id];
        data.due_date = Some(Utc::now() + Duration::days(2));

        let task = Task::create(&f.db, f.owner.id, &data).await.unwrap();
        assert_eq!(task.created_by, Some(f.owner.id));
        assert_eq!(task.created_by_username.as_deref(), Some("owner"));
        assert_eq!(task.project_name, "Website");
        assert_eq!(task.priority_name.as_deref(), Some("High"));
        assert_eq!(task.priority_details.as_ref().map(|p| p.level), Some(4));
        assert_eq!(task.status_name.as_deref(), Some(IN_PROGRESS));
        assert_eq!(task.tags, vec![tag.id]);
        assert_eq!(task.tags_details[0].name, "work");
        assert_eq!(task.tags_list, task.tags_details);
    }

    #[tokio::test]
    async fn past_due_date_and_duplicate_title_are_rejected() {
        let f = fixture().await;
        let mut data = f.new_task("Write intro");
        data.due_date = Some(Utc::now() - Duration::minutes(1));
        let err = Task::create(&f.db, f.owner.id, &data).await.unwrap_err();
        assert!(matches!(err, ModelError::Validation(ref e) if e.contains("due_date")));

        data.due_date = None;
        let first = Task::create(&f.db, f.owner.id, &data).await.unwrap();
        let err = Task::create(&f.db, f.owner.id, &data).await.unwrap_err();
        assert!(matches!(err, ModelError::Validation(ref e) if e.contains("title")));

        // Saving the task under its own title is not a duplicate.
        let same = UpdateTask {
            title: Some("Write intro".to_string()),
            ..Default::default()
        };
        assert!(Task::update(&f.db, f.owner.id, first.id, &same).await.is_ok());

        let past = UpdateTask {
            due_date: Some(Some(Utc::now() - Duration::days(1))),
            ..Default::default()
        };
        let err = Task::update(&f.db, f.owner.id, first.id, &past)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Validation(ref e) if e.contains("due_date")));
    }

    #[tokio::test]
    async fn writes_require_owned_project_and_own_tags() {
        let f = fixture().await;
        let stranger = create_user(&f.db, "stranger").await;
        let err = Task::create(&f.db, stranger.id, &f.new_task("Sneaky"))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Validation(ref e) if e.contains("project")));

        let foreign_tag = Tag::create(
            &f.db,
            stranger.id,
            &CreateTag {
                name: "theirs".to_string(),
                color: "#007bff".to_string(),
            },
        )
        .await
        .unwrap();
        let mut data = f.new_task("Tagged");
        data.tags = vec![foreign_tag.id];
        data.priority = Some(999);
        let err = Task::create(&f.db, f.owner.id, &data).await.unwrap_err();
        match err {
            ModelError::Validation(errors) => {
                assert!(errors.contains("tags"));
                assert!(errors.contains("priority"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_is_partial_and_blank_description_clears() {
        let f = fixture().await;
        let mut data = f.new_task("Buy milk");
        data.description = Some("two bottles".to_string());
        data.priority = Some(f.low.id);
        let task = Task::create(&f.db, f.owner.id, &data).await.unwrap();

        let update: UpdateTask = serde_json::from_str(r#"{"description": ""}"#).unwrap();
        let updated = Task::update(&f.db, f.owner.id, task.id, &update)
            .await
            .unwrap();
        assert_eq!(updated.description, None);
        assert_eq!(updated.priority, Some(f.low.id));
        assert_eq!(updated.title, "Buy milk");

        let update: UpdateTask = serde_json::from_str(r#"{"priority": null}"#).unwrap();
        let updated = Task::update(&f.db, f.owner.id, task.id, &update)
            .await
            .unwrap();
        assert_eq!(updated.priority, None);
    }

    #[tokio::test]
    async fn visibility_covers_owner_assignee_and_creator() {
        let f = fixture().await;
        let assignee = create_user(&f.db, "assignee").await;
        let outsider = create_user(&f.db, "outsider").await;
        let mut data = f.new_task("Shared");
        data.assigned_to = Some(assignee.id);
        let task = Task::create(&f.db, f.owner.id, &data).await.unwrap();

        assert!(Task::find_visible(&f.db, f.owner.id, task.id).await.unwrap().is_some());
        assert!(Task::find_visible(&f.db, assignee.id, task.id).await.unwrap().is_some());
        assert!(Task::find_visible(&f.db, outsider.id, task.id).await.unwrap().is_none());

        let page = Task::find_page(&f.db, outsider.id, &TaskQuery::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.count, 0);
        assert!(matches!(
            Task::delete(&f.db, outsider.id, task.id).await,
            Err(ModelError::NotFound("Task"))
        ));
        assert!(matches!(
            Task::history(&f.db, outsider.id, task.id).await,
            Err(ModelError::NotFound("Task"))
        ));
    }

    #[tokio::test]
    async fn list_filters_and_orders_by_priority_level() {
        let f = fixture().await;
        let soon = Utc::now() + Duration::days(1);
        f.insert("a-high", Some(soon), Some(&f.high), Some(&f.open), Some(f.owner.id))
            .await;
        f.insert("b-low", None, Some(&f.low), None, Some(f.owner.id))
            .await;
        f.insert("c-none", None, None, Some(&f.done), Some(f.owner.id))
            .await;

        let query = TaskQuery {
            ordering: Some("-priority__level".to_string()),
            ..Default::default()
        };
        let page = Task::find_page(&f.db, f.owner.id, &query, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.count, 3);
        assert_eq!(page.results[0].title, "a-high");
        assert_eq!(page.results[0].priority_name.as_deref(), Some("High"));

        let query = TaskQuery {
            priority_level: Some(1),
            ..Default::default()
        };
        let page = Task::find_page(&f.db, f.owner.id, &query, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].title, "b-low");

        let query = TaskQuery {
            due_date_from: Some(Utc::now()),
            ..Default::default()
        };
        let page = Task::find_page(&f.db, f.owner.id, &query, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.count, 1);

        let query = TaskQuery {
            search: Some("none".to_string()),
            status: Some(f.done.id),
            ..Default::default()
        };
        let page = Task::find_page(&f.db, f.owner.id, &query, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].status_name.as_deref(), Some(COMPLETED));

        let page2 = PageRequest::new(Some(2), Some(2), 10);
        let page = Task::find_page(&f.db, f.owner.id, &TaskQuery::default(), page2)
            .await
            .unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.previous, Some(1));
        assert_eq!(page.next, None);
        assert!(matches!(
            Task::find_page(
                &f.db,
                f.owner.id,
                &TaskQuery::default(),
                PageRequest::new(Some(3), Some(2), 10)
            )
            .await,
            Err(ModelError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn upcoming_week_and_overdue_windows() {
        let f = fixture().await;
        let now = Utc::now();
        let me = Some(f.owner.id);
        f.insert("in-3-days", Some(now + Duration::days(3)), None, None, me)
            .await;
        f.insert("in-8-days", Some(now + Duration::days(8)), None, None, me)
            .await;
        f.insert("late-open", Some(now - Duration::days(1)), None, Some(&f.open), me)
            .await;
        f.insert("late-no-status", Some(now - Duration::hours(2)), None, None, me)
            .await;
        f.insert("late-done", Some(now - Duration::days(1)), None, Some(&f.done), me)
            .await;
        f.insert("no-date", None, None, None, me).await;

        let upcoming = Task::upcoming_week(&f.db, f.owner.id, now).await.unwrap();
        assert_eq!(titles(&upcoming), ["in-3-days"]);

        let overdue = Task::overdue(&f.db, f.owner.id, now).await.unwrap();
        assert_eq!(overdue.count, 2);
        assert_eq!(titles(&overdue.tasks), ["late-no-status", "late-open"]);
    }

    #[tokio::test]
    async fn urgent_or_tomorrow_combines_both_arms() {
        let f = fixture().await;
        let now = Utc::now();
        let me = Some(f.owner.id);
        let tomorrow = task_filters::tomorrow_start(now) + Duration::hours(12);
        f.insert("urgent-open", None, Some(&f.high), Some(&f.open), me)
            .await;
        f.insert("urgent-done", None, Some(&f.high), Some(&f.done), me)
            .await;
        f.insert("low-tomorrow", Some(tomorrow), Some(&f.low), Some(&f.done), me)
            .await;
        f.insert("low-later", Some(tomorrow + Duration::days(2)), Some(&f.low), None, me)
            .await;

        let tasks = Task::urgent_or_tomorrow(&f.db, f.owner.id, now).await.unwrap();
        assert_eq!(titles(&tasks), ["low-tomorrow", "urgent-open"]);
    }

    #[tokio::test]
    async fn others_in_progress_or_cancelled_ignores_visibility() {
        let f = fixture().await;
        let cancelled = Status::create(
            &f.db,
            &CreateStatus {
                name: CANCELLED.to_string(),
                color: "#dc3545".to_string(),
            },
            None,
        )
        .await
        .unwrap();
        let other = create_user(&f.db, "other").await;
        f.insert("mine-open", None, None, Some(&f.open), Some(f.owner.id))
            .await;
        f.insert("theirs-open", None, None, Some(&f.open), Some(other.id))
            .await;
        f.insert("theirs-cancelled", None, None, Some(&cancelled), Some(other.id))
            .await;
        f.insert("theirs-done", None, None, Some(&f.done), Some(other.id))
            .await;
        f.insert("orphan-open", None, None, Some(&f.open), None).await;

        let tasks = Task::others_in_progress_or_cancelled(&f.db, f.owner.id)
            .await
            .unwrap();
        assert_eq!(
            titles(&tasks),
            ["orphan-open", "theirs-cancelled", "theirs-open"]
        );
    }

    #[tokio::test]
    async fn change_status_and_history() {
        let f = fixture().await;
        let task = Task::create(&f.db, f.owner.id, &f.new_task("Ship it"))
            .await
            .unwrap();

        let missing = Task::change_status(&f.db, f.owner.id, task.id, None).await;
        assert!(matches!(missing, Err(ModelError::Validation(ref e)) if e.contains("status_id")));
        let unknown = Task::change_status(&f.db, f.owner.id, task.id, Some(999)).await;
        assert!(matches!(unknown, Err(ModelError::NotFound("Status"))));

        let changed = Task::change_status(&f.db, f.owner.id, task.id, Some(f.done.id))
            .await
            .unwrap();
        assert_eq!(changed.task.status, Some(f.done.id));
        assert!(changed.message.contains(COMPLETED));

        let history = Task::history(&f.db, f.owner.id, task.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].change_type, ChangeType::Updated);
        assert_eq!(history[0].status.as_deref(), Some(COMPLETED));
        assert_eq!(history[0].changed_by, "owner");
        assert_eq!(history[1].change_type, ChangeType::Created);
        assert_eq!(history[1].status, None);
        assert_eq!(history[1].title, "Ship it");
    }

    #[tokio::test]
    async fn unreadable_snapshot_still_lists_the_entry() {
        let f = fixture().await;
        let task = Task::create(&f.db, f.owner.id, &f.new_task("Ship it"))
            .await
            .unwrap();
        History::record(
            &f.db,
            TrackedEntity::Task,
            task.id,
            ChangeType::Updated,
            &serde_json::json!(42),
            None,
        )
        .await
        .unwrap();

        let history = Task::history(&f.db, f.owner.id, task.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].title, "");
        assert_eq!(history[0].status, None);
        assert_eq!(history[0].changed_by, SYSTEM_ACTOR);
        assert_eq!(history[1].title, "Ship it");
    }

    #[tokio::test]
    async fn due_date_filters_accept_bare_dates() {
        let f = fixture().await;
        let mut early = f.new_task("early");
        early.due_date = Some(Utc::now() + Duration::days(2));
        Task::create(&f.db, f.owner.id, &early).await.unwrap();
        let mut late = f.new_task("late");
        late.due_date = Some(Utc::now() + Duration::days(20));
        Task::create(&f.db, f.owner.id, &late).await.unwrap();

        let cutoff = (Utc::now() + Duration::days(10)).date_naive();
        let query: TaskQuery = serde_json::from_value(serde_json::json!({
            "due_date_from": cutoff.format("%Y-%m-%d").to_string(),
        }))
        .unwrap();
        assert_eq!(
            query.due_date_from,
            cutoff.and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc())
        );
        let page = Task::find_page(&f.db, f.owner.id, &query, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].title, "late");

        let query: TaskQuery = serde_json::from_value(serde_json::json!({
            "due_date_to": (Utc::now() + Duration::days(10)).to_rfc3339(),
        }))
        .unwrap();
        let page = Task::find_page(&f.db, f.owner.id, &query, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].title, "early");
    }

    #[tokio::test]
    async fn deleting_references_keeps_tasks_but_deleting_project_removes_them() {
        let f = fixture().await;
        let mut data = f.new_task("Keep me");
        data.priority = Some(f.high.id);
        data.status = Some(f.open.id);
        let task = Task::create(&f.db, f.owner.id, &data).await.unwrap();

        Priority::delete(&f.db, f.high.id, None).await.unwrap();
        Status::delete(&f.db, f.open.id, None).await.unwrap();
        let survived = Task::find_visible(&f.db, f.owner.id, task.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(survived.priority, None);
        assert_eq!(survived.status, None);

        Project::delete(&f.db, f.owner.id, f.project.id).await.unwrap();
        assert!(task::Entity::find_by_id(task.id).one(&f.db).await.unwrap().is_none());
        let records = History::for_entity(&f.db, TrackedEntity::Task, task.id)
            .await
            .unwrap();
        assert_eq!(records[0].change_type, ChangeType::Deleted);
    }
}
