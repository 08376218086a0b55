//! Demo data for local development. Re-running is safe: every row is looked up
//! by its natural key before it is created.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, TransactionSession, TransactionTrait,
};
use serde::Serialize;

use crate::{
    entities::{priority, project, status, tag, task},
    models::{
        priority::{CreatePriority, Priority},
        project::{CreateProject, Project},
        status::{CreateStatus, Status},
        tag::{CreateTag, Tag},
        task::{NewTaskRecord, Task},
        user::{CreateUser, User},
        validation::ModelError,
    },
};

pub const SEED_USERNAME: &str = "testuser";

const PRIORITIES: [(&str, i32); 5] = [
    ("Очень низкий", 1),
    ("Низкий", 2),
    ("Средний", 3),
    ("Высокий", 4),
    ("Критический", 5),
];

const STATUSES: [(&str, &str); 5] = [
    ("Новая", "#6c757d"),
    ("В работе", "#007bff"),
    ("На проверке", "#ffc107"),
    ("Завершена", "#28a745"),
    ("Отменена", "#dc3545"),
];

const TAGS: [(&str, &str); 4] = [
    ("Работа", "#007bff"),
    ("Личное", "#28a745"),
    ("Срочно", "#dc3545"),
    ("Важно", "#ffc107"),
];

const PROJECTS: [(&str, &str); 3] = [
    ("Разработка сайта", "Проект по разработке корпоративного сайта"),
    ("Личные дела", "Личные задачи и покупки"),
    ("Курсовая работа", "Выполнение курсовой работы по Django"),
];

struct SeedTask {
    title: &'static str,
    description: &'static str,
    project: &'static str,
    priority_level: i32,
    status: &'static str,
    due_in_days: i64,
    tags: &'static [&'static str],
}

const TASKS: [SeedTask; 5] = [
    SeedTask {
        title: "Создать дизайн главной страницы",
        description: "Разработать макет главной страницы в Figma",
        project: "Разработка сайта",
        priority_level: 4,
        status: "В работе",
        due_in_days: 3,
        tags: &["Работа", "Важно"],
    },
    SeedTask {
        title: "Настроить базу данных",
        description: "Создать модели и миграции для проекта",
        project: "Разработка сайта",
        priority_level: 5,
        status: "Завершена",
        due_in_days: -1,
        tags: &["Работа"],
    },
    SeedTask {
        title: "Купить продукты",
        description: "Молоко, хлеб, яйца",
        project: "Личные дела",
        priority_level: 2,
        status: "Новая",
        due_in_days: 1,
        tags: &["Личное"],
    },
    SeedTask {
        title: "Написать введение",
        description: "Написать введение к курсовой работе",
        project: "Курсовая работа",
        priority_level: 3,
        status: "На проверке",
        due_in_days: 7,
        tags: &["Важно"],
    },
    SeedTask {
        title: "Провести тестирование API",
        description: "Протестировать все endpoints REST API",
        project: "Разработка сайта",
        priority_level: 4,
        status: "Новая",
        due_in_days: 5,
        tags: &["Работа", "Срочно"],
    },
];

/// Row counts after seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub priorities: u64,
    pub statuses: u64,
    pub tags: u64,
    pub projects: u64,
    pub tasks: u64,
}

/// Removes every row through the model delete paths so each removal is
/// recorded in the history table.
async fn clear_data<C: ConnectionTrait + TransactionTrait>(db: &C) -> Result<(), ModelError> {
    let txn = db.begin().await?;
    for record in project::Entity::find().all(&txn).await? {
        Project::delete(&txn, record.owner_id, record.id).await?;
    }
    for record in tag::Entity::find().all(&txn).await? {
        Tag::delete(&txn, record.user_id, record.id).await?;
    }
    for record in status::Entity::find().all(&txn).await? {
        Status::delete(&txn, record.id, None).await?;
    }
    for record in priority::Entity::find().all(&txn).await? {
        Priority::delete(&txn, record.id, None).await?;
    }
    txn.commit().await?;
    tracing::warn!("Cleared existing tasks, projects, tags, statuses and priorities");
    Ok(())
}

pub async fn fill_test_data<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    clear: bool,
) -> Result<SeedSummary, ModelError> {
    if clear {
        clear_data(db).await?;
    }

    let mut priorities = HashMap::new();
    for (name, level) in PRIORITIES {
        let priority = match Priority::find_by_name(db, name).await? {
            Some(existing) => existing,
            None => {
                let data = CreatePriority {
                    name: name.to_string(),
                    level,
                };
                let created = Priority::create(db, &data, None).await?;
                tracing::info!("Created priority '{}'", created.name);
                created
            }
        };
        priorities.insert(level, priority.id);
    }

    let mut statuses = HashMap::new();
    for (name, color) in STATUSES {
        let status = match Status::find_by_name(db, name).await? {
            Some(existing) => existing,
            None => {
                let data = CreateStatus {
                    name: name.to_string(),
                    color: color.to_string(),
                };
                let created = Status::create(db, &data, None).await?;
                tracing::info!("Created status '{}'", created.name);
                created
            }
        };
        statuses.insert(name, status.id);
    }

    let user = match User::find_by_username(db, SEED_USERNAME).await? {
        Some(existing) => existing,
        None => {
            let data = CreateUser {
                username: SEED_USERNAME.to_string(),
                email: "test@example.com".to_string(),
                first_name: "Тест".to_string(),
                last_name: "Пользователь".to_string(),
                is_superuser: false,
            };
            User::create(db, &data).await?.0
        }
    };

    let mut tags = HashMap::new();
    for (name, color) in TAGS {
        let existing = tag::Entity::find()
            .filter(tag::Column::UserId.eq(user.id))
            .filter(tag::Column::Name.eq(name))
            .one(db)
            .await?;
        let id = match existing {
            Some(model) => model.id,
            None => {
                let data = CreateTag {
                    name: name.to_string(),
                    color: color.to_string(),
                };
                Tag::create(db, user.id, &data).await?.id
            }
        };
        tags.insert(name, id);
    }

    let mut projects = HashMap::new();
    for (name, description) in PROJECTS {
        let existing = project::Entity::find()
            .filter(project::Column::OwnerId.eq(user.id))
            .filter(project::Column::Name.eq(name))
            .one(db)
            .await?;
        let id = match existing {
            Some(model) => model.id,
            None => {
                let data = CreateProject {
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    image: None,
                };
                Project::create(db, user.id, &data).await?.id
            }
        };
        projects.insert(name, id);
    }

    let now = Utc::now();
    for seed in &TASKS {
        let Some(&project_id) = projects.get(seed.project) else {
            continue;
        };
        let exists = task::Entity::find()
            .filter(task::Column::ProjectId.eq(project_id))
            .filter(task::Column::Title.eq(seed.title))
            .one(db)
            .await?
            .is_some();
        if exists {
            continue;
        }

        let txn = db.begin().await?;
        Task::insert_record(
            &txn,
            NewTaskRecord {
                title: seed.title.to_string(),
                description: Some(seed.description.to_string()),
                project_id,
                priority_id: priorities.get(&seed.priority_level).copied(),
                status_id: statuses.get(seed.status).copied(),
                assigned_to_id: Some(user.id),
                due_date: Some(now + Duration::days(seed.due_in_days)),
                created_by_id: Some(user.id),
                tag_ids: seed
                    .tags
                    .iter()
                    .filter_map(|name| tags.get(name).copied())
                    .collect(),
            },
        )
        .await?;
        txn.commit().await?;
        tracing::info!("Created task '{}'", seed.title);
    }

    let summary = SeedSummary {
        priorities: priority::Entity::find().count(db).await?,
        statuses: status::Entity::find().count(db).await?,
        tags: tag::Entity::find().count(db).await?,
        projects: project::Entity::find().count(db).await?,
        tasks: task::Entity::find().count(db).await?,
    };
    tracing::info!(?summary, "Seeding finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entities::history_record,
        types::{ChangeType, TrackedEntity},
        test_utils::{create_user, setup_db},
    };

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let db = setup_db().await;
        let expected = SeedSummary {
            priorities: 5,
            statuses: 5,
            tags: 4,
            projects: 3,
            tasks: 5,
        };

        assert_eq!(fill_test_data(&db, false).await.unwrap(), expected);
        assert_eq!(fill_test_data(&db, false).await.unwrap(), expected);
        assert_eq!(fill_test_data(&db, true).await.unwrap(), expected);
    }

    async fn deletions(db: &crate::DbPool, entity: Option<TrackedEntity>) -> u64 {
        let mut select = history_record::Entity::find()
            .filter(history_record::Column::ChangeType.eq(ChangeType::Deleted));
        if let Some(entity) = entity {
            select = select.filter(history_record::Column::EntityType.eq(entity));
        }
        select.count(db).await.unwrap()
    }

    #[tokio::test]
    async fn clearing_records_a_deletion_for_every_row() {
        let db = setup_db().await;
        fill_test_data(&db, false).await.unwrap();

        assert_eq!(deletions(&db, None).await, 0);

        fill_test_data(&db, true).await.unwrap();

        // 5 priorities, 5 statuses, 4 tags, 3 projects and 5 tasks.
        assert_eq!(deletions(&db, None).await, 22);
        assert_eq!(deletions(&db, Some(TrackedEntity::Task)).await, 5);
        assert_eq!(deletions(&db, Some(TrackedEntity::Project)).await, 3);
    }

    #[tokio::test]
    async fn seeded_data_drives_the_shortcuts() {
        let db = setup_db().await;
        fill_test_data(&db, false).await.unwrap();
        let user = User::find_by_username(&db, SEED_USERNAME)
            .await
            .unwrap()
            .unwrap();

        // The only past task is already completed.
        let overdue = Task::overdue(&db, user.id, Utc::now()).await.unwrap();
        assert_eq!(overdue.count, 0);

        let upcoming = Task::upcoming_week(&db, user.id, Utc::now()).await.unwrap();
        assert_eq!(upcoming.len(), 4);

        let other = create_user(&db, "someone").await;
        let others = Task::others_in_progress_or_cancelled(&db, other.id)
            .await
            .unwrap();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].title, "Создать дизайн главной страницы");
    }
}
