use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    Set, TransactionSession, TransactionTrait, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{
    history::History,
    page::{Page, PageRequest, fetch_page, parse_ordering},
    validation::{FieldErrors, ModelError},
};
use crate::{
    entities::{priority, task},
    types::{ChangeType, TrackedEntity},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Priority {
    pub id: i64,
    pub name: String,
    pub level: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePriority {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: String,
    #[validate(range(min = 1, max = 5, message = "Level must be between 1 and 5"))]
    pub level: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePriority {
    pub name: Option<String>,
    pub level: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriorityQuery {
    pub level: Option<i32>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl Priority {
    pub(crate) fn from_model(model: priority::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            level: model.level,
        }
    }

    pub async fn find_page<C: ConnectionTrait>(
        db: &C,
        query: &PriorityQuery,
        page: PageRequest,
    ) -> Result<Page<Self>, ModelError> {
        let mut select = priority::Entity::find();
        if let Some(level) = query.level {
            select = select.filter(priority::Column::Level.eq(level));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            select = select.filter(priority::Column::Name.contains(search));
        }

        let (field, order) = parse_ordering(
            query.ordering.as_deref(),
            &["level", "name"],
            ("level", Order::Asc),
        );
        let column = match field {
            "name" => priority::Column::Name,
            _ => priority::Column::Level,
        };
        select = select.order_by(column, order);

        Ok(fetch_page(db, select, page).await?.map(Self::from_model))
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Self>, ModelError> {
        let record = priority::Entity::find_by_id(id).one(db).await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_name<C: ConnectionTrait>(
        db: &C,
        name: &str,
    ) -> Result<Option<Self>, ModelError> {
        let record = priority::Entity::find()
            .filter(priority::Column::Name.eq(name))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    async fn check_unique<C: ConnectionTrait>(
        db: &C,
        data: &CreatePriority,
        exclude: Option<i64>,
    ) -> Result<(), ModelError> {
        let mut errors = FieldErrors::new();
        let mut by_name = priority::Entity::find().filter(priority::Column::Name.eq(data.name.as_str()));
        let mut by_level = priority::Entity::find().filter(priority::Column::Level.eq(data.level));
        if let Some(id) = exclude {
            by_name = by_name.filter(priority::Column::Id.ne(id));
            by_level = by_level.filter(priority::Column::Id.ne(id));
        }
        if by_name.one(db).await?.is_some() {
            errors.add("name", "Priority with this name already exists");
        }
        if by_level.one(db).await?.is_some() {
            errors.add("level", "Priority with this level already exists");
        }
        errors.into_result()
    }

    pub async fn create<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        data: &CreatePriority,
        actor: Option<i64>,
    ) -> Result<Self, ModelError> {
        data.validate()?;
        let txn = db.begin().await?;
        Self::check_unique(&txn, data, None).await?;

        let active = priority::ActiveModel {
            name: Set(data.name.clone()),
            level: Set(data.level),
            ..Default::default()
        };
        let model = active.insert(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Priority,
            model.id,
            ChangeType::Created,
            &model,
            actor,
        )
        .await?;
        txn.commit().await?;
        Ok(Self::from_model(model))
    }

    pub async fn update<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        id: i64,
        data: &UpdatePriority,
        actor: Option<i64>,
    ) -> Result<Self, ModelError> {
        let txn = db.begin().await?;
        let record = priority::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(ModelError::NotFound("Priority"))?;

        let merged = CreatePriority {
            name: data.name.clone().unwrap_or_else(|| record.name.clone()),
            level: data.level.unwrap_or(record.level),
        };
        merged.validate()?;
        Self::check_unique(&txn, &merged, Some(id)).await?;

        let mut active: priority::ActiveModel = record.into();
        active.name = Set(merged.name);
        active.level = Set(merged.level);
        let model = active.update(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Priority,
            model.id,
            ChangeType::Updated,
            &model,
            actor,
        )
        .await?;
        txn.commit().await?;
        Ok(Self::from_model(model))
    }

    /// Tasks keep existing with their priority cleared.
    pub async fn delete<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        id: i64,
        actor: Option<i64>,
    ) -> Result<(), ModelError> {
        let txn = db.begin().await?;
        let record = priority::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(ModelError::NotFound("Priority"))?;

        task::Entity::update_many()
            .col_expr(task::Column::PriorityId, Expr::value(Option::<i64>::None))
            .filter(task::Column::PriorityId.eq(id))
            .exec(&txn)
            .await?;
        priority::Entity::delete_by_id(id).exec(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Priority,
            id,
            ChangeType::Deleted,
            &record,
            actor,
        )
        .await?;
        txn.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::history::History, test_utils::setup_db};

    fn new_priority(name: &str, level: i32) -> CreatePriority {
        CreatePriority {
            name: name.to_string(),
            level,
        }
    }

    #[tokio::test]
    async fn level_must_be_within_one_to_five() {
        let db = setup_db().await;
        for level in [0, 6, -1] {
            let err = Priority::create(&db, &new_priority("Bad", level), None)
                .await
                .unwrap_err();
            assert!(matches!(err, ModelError::Validation(ref e) if e.contains("level")));
        }
        assert!(Priority::create(&db, &new_priority("Low", 1), None).await.is_ok());
        assert!(Priority::create(&db, &new_priority("Top", 5), None).await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_name_or_level_is_a_validation_error() {
        let db = setup_db().await;
        let low = Priority::create(&db, &new_priority("Low", 1), None)
            .await
            .unwrap();

        let err = Priority::create(&db, &new_priority("Low", 2), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Validation(ref e) if e.contains("name")));
        let err = Priority::create(&db, &new_priority("Other", 1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Validation(ref e) if e.contains("level")));

        // Re-saving its own values is fine.
        let same = UpdatePriority {
            name: Some("Low".to_string()),
            level: Some(1),
        };
        assert!(Priority::update(&db, low.id, &same, None).await.is_ok());
    }

    #[tokio::test]
    async fn list_filters_and_orders() {
        let db = setup_db().await;
        Priority::create(&db, &new_priority("High", 4), None).await.unwrap();
        Priority::create(&db, &new_priority("Low", 1), None).await.unwrap();
        Priority::create(&db, &new_priority("Medium", 3), None).await.unwrap();

        let page = Priority::find_page(&db, &PriorityQuery::default(), PageRequest::default())
            .await
            .unwrap();
        let levels: Vec<_> = page.results.iter().map(|p| p.level).collect();
        assert_eq!(levels, [1, 3, 4]);

        let query = PriorityQuery {
            ordering: Some("-name".to_string()),
            ..Default::default()
        };
        let page = Priority::find_page(&db, &query, PageRequest::default())
            .await
            .unwrap();
        let names: Vec<_> = page.results.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Medium", "Low", "High"]);

        let query = PriorityQuery {
            level: Some(4),
            ..Default::default()
        };
        let page = Priority::find_page(&db, &query, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].name, "High");
    }

    #[tokio::test]
    async fn writes_are_recorded_in_history() {
        let db = setup_db().await;
        let p = Priority::create(&db, &new_priority("Low", 1), Some(9))
            .await
            .unwrap();
        let update = UpdatePriority {
            level: Some(2),
            ..Default::default()
        };
        Priority::update(&db, p.id, &update, Some(9)).await.unwrap();
        Priority::delete(&db, p.id, None).await.unwrap();

        let records = History::for_entity(&db, TrackedEntity::Priority, p.id)
            .await
            .unwrap();
        let changes: Vec<_> = records.iter().map(|r| r.change_type).collect();
        assert_eq!(
            changes,
            [ChangeType::Deleted, ChangeType::Updated, ChangeType::Created]
        );
        assert_eq!(records[1].snapshot["level"], 2);
        assert_eq!(records[2].changed_by_id, Some(9));
        assert!(Priority::find_by_id(&db, p.id).await.unwrap().is_none());
    }
}
