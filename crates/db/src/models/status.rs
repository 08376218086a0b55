use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    Set, TransactionSession, TransactionTrait, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{
    history::History,
    page::{Page, PageRequest, fetch_page, parse_ordering},
    validation::{FieldErrors, ModelError, validate_hex_color},
};
use crate::{
    entities::{status, task},
    types::{ChangeType, TrackedEntity},
};

pub const COMPLETED: &str = "Завершена";
pub const IN_PROGRESS: &str = "В работе";
pub const CANCELLED: &str = "Отменена";

const DEFAULT_COLOR: &str = "#808080";

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: i64,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateStatus {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: String,
    #[validate(custom(function = "validate_hex_color"))]
    #[serde(default = "default_color")]
    pub color: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStatus {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQuery {
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl Status {
    pub(crate) fn from_model(model: status::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            color: model.color,
        }
    }

    pub async fn find_page<C: ConnectionTrait>(
        db: &C,
        query: &StatusQuery,
        page: PageRequest,
    ) -> Result<Page<Self>, ModelError> {
        let mut select = status::Entity::find();
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            select = select.filter(status::Column::Name.contains(search));
        }
        let (_, order) = parse_ordering(query.ordering.as_deref(), &["name"], ("name", Order::Asc));
        select = select.order_by(status::Column::Name, order);

        Ok(fetch_page(db, select, page).await?.map(Self::from_model))
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Self>, ModelError> {
        let record = status::Entity::find_by_id(id).one(db).await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_name<C: ConnectionTrait>(
        db: &C,
        name: &str,
    ) -> Result<Option<Self>, ModelError> {
        let record = status::Entity::find()
            .filter(status::Column::Name.eq(name))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    async fn check_unique<C: ConnectionTrait>(
        db: &C,
        name: &str,
        exclude: Option<i64>,
    ) -> Result<(), ModelError> {
        let mut select = status::Entity::find().filter(status::Column::Name.eq(name));
        if let Some(id) = exclude {
            select = select.filter(status::Column::Id.ne(id));
        }
        if select.one(db).await?.is_some() {
            return Err(FieldErrors::single("name", "Status with this name already exists").into());
        }
        Ok(())
    }

    pub async fn create<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        data: &CreateStatus,
        actor: Option<i64>,
    ) -> Result<Self, ModelError> {
        data.validate()?;
        let txn = db.begin().await?;
        Self::check_unique(&txn, &data.name, None).await?;

        let active = status::ActiveModel {
            name: Set(data.name.clone()),
            color: Set(data.color.clone()),
            ..Default::default()
        };
        let model = active.insert(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Status,
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
        data: &UpdateStatus,
        actor: Option<i64>,
    ) -> Result<Self, ModelError> {
        let txn = db.begin().await?;
        let record = status::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(ModelError::NotFound("Status"))?;

        let merged = CreateStatus {
            name: data.name.clone().unwrap_or_else(|| record.name.clone()),
            color: data.color.clone().unwrap_or_else(|| record.color.clone()),
        };
        merged.validate()?;
        Self::check_unique(&txn, &merged.name, Some(id)).await?;

        let mut active: status::ActiveModel = record.into();
        active.name = Set(merged.name);
        active.color = Set(merged.color);
        let model = active.update(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Status,
            model.id,
            ChangeType::Updated,
            &model,
            actor,
        )
        .await?;
        txn.commit().await?;
        Ok(Self::from_model(model))
    }

    /// Tasks keep existing with their status cleared.
    pub async fn delete<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        id: i64,
        actor: Option<i64>,
    ) -> Result<(), ModelError> {
        let txn = db.begin().await?;
        let record = status::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(ModelError::NotFound("Status"))?;

        task::Entity::update_many()
            .col_expr(task::Column::StatusId, Expr::value(Option::<i64>::None))
            .filter(task::Column::StatusId.eq(id))
            .exec(&txn)
            .await?;
        status::Entity::delete_by_id(id).exec(&txn).await?;
        History::record(
            &txn,
            TrackedEntity::Status,
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
    use crate::test_utils::setup_db;

    #[tokio::test]
    async fn color_defaults_and_is_validated() {
        let db = setup_db().await;
        let data: CreateStatus = serde_json::from_value(serde_json::json!({"name": "New"})).unwrap();
        let status = Status::create(&db, &data, None).await.unwrap();
        assert_eq!(status.color, DEFAULT_COLOR);

        let bad = UpdateStatus {
            color: Some("blue".to_string()),
            ..Default::default()
        };
        let err = Status::update(&db, status.id, &bad, None).await.unwrap_err();
        assert!(matches!(err, ModelError::Validation(ref e) if e.contains("color")));
    }

    #[tokio::test]
    async fn names_are_unique_and_searchable() {
        let db = setup_db().await;
        let make = |name: &str| CreateStatus {
            name: name.to_string(),
            color: DEFAULT_COLOR.to_string(),
        };
        Status::create(&db, &make(IN_PROGRESS), None).await.unwrap();
        Status::create(&db, &make(COMPLETED), None).await.unwrap();

        let err = Status::create(&db, &make(COMPLETED), None).await.unwrap_err();
        assert!(matches!(err, ModelError::Validation(ref e) if e.contains("name")));

        let query = StatusQuery {
            search: Some("работе".to_string()),
            ..Default::default()
        };
        let page = Status::find_page(&db, &query, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].name, IN_PROGRESS);
    }

    #[tokio::test]
    async fn unknown_status_is_not_found() {
        let db = setup_db().await;
        assert!(matches!(
            Status::delete(&db, 42, None).await,
            Err(ModelError::NotFound("Status"))
        ));
    }

    #[tokio::test]
    async fn writes_are_recorded_in_history() {
        let db = setup_db().await;
        let data = CreateStatus {
            name: "New".to_string(),
            color: DEFAULT_COLOR.to_string(),
        };
        let status = Status::create(&db, &data, Some(3)).await.unwrap();
        let update = UpdateStatus {
            color: Some("#112233".to_string()),
            ..Default::default()
        };
        Status::update(&db, status.id, &update, Some(3)).await.unwrap();
        Status::delete(&db, status.id, None).await.unwrap();

        let records = History::for_entity(&db, TrackedEntity::Status, status.id)
            .await
            .unwrap();
        let changes: Vec<_> = records.iter().map(|r| r.change_type).collect();
        assert_eq!(
            changes,
            [ChangeType::Deleted, ChangeType::Updated, ChangeType::Created]
        );
        assert_eq!(records[1].snapshot["color"], "#112233");
        assert_eq!(records[2].changed_by_id, Some(3));
        assert_eq!(records[0].changed_by_id, None);
    }
}
