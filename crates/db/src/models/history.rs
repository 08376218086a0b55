use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::Serialize;

use crate::{
    entities::history_record,
    types::{ChangeType, TrackedEntity},
};

pub type HistoryRecord = history_record::Model;

/// Append-only audit trail. Model writes call [`History::record`] on the same
/// transaction as the row change.
pub struct History;

impl History {
    pub async fn record<C: ConnectionTrait, S: Serialize>(
        db: &C,
        entity_type: TrackedEntity,
        entity_id: i64,
        change_type: ChangeType,
        snapshot: &S,
        changed_by: Option<i64>,
    ) -> Result<(), DbErr> {
        let snapshot =
            serde_json::to_value(snapshot).map_err(|err| DbErr::Json(err.to_string()))?;
        let active = history_record::ActiveModel {
            entity_type: Set(entity_type),
            entity_id: Set(entity_id),
            change_type: Set(change_type),
            snapshot: Set(snapshot),
            changed_by_id: Set(changed_by),
            changed_at: Set(Utc::now()),
            ..Default::default()
        };
        active.insert(db).await?;
        tracing::debug!(
            "Recorded {} {} #{}",
            change_type,
            entity_type,
            entity_id
        );
        Ok(())
    }

    /// Newest first.
    pub async fn for_entity<C: ConnectionTrait>(
        db: &C,
        entity_type: TrackedEntity,
        entity_id: i64,
    ) -> Result<Vec<HistoryRecord>, DbErr> {
        history_record::Entity::find()
            .filter(history_record::Column::EntityType.eq(entity_type))
            .filter(history_record::Column::EntityId.eq(entity_id))
            .order_by_desc(history_record::Column::ChangedAt)
            .order_by_desc(history_record::Column::Id)
            .all(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_utils::setup_db;

    #[tokio::test]
    async fn records_are_returned_newest_first() {
        let db = setup_db().await;

        History::record(
            &db,
            TrackedEntity::Task,
            7,
            ChangeType::Created,
            &json!({"title": "a"}),
            Some(1),
        )
        .await
        .unwrap();
        History::record(
            &db,
            TrackedEntity::Task,
            7,
            ChangeType::Updated,
            &json!({"title": "b"}),
            None,
        )
        .await
        .unwrap();
        History::record(
            &db,
            TrackedEntity::Project,
            7,
            ChangeType::Created,
            &json!({"name": "p"}),
            Some(1),
        )
        .await
        .unwrap();

        let records = History::for_entity(&db, TrackedEntity::Task, 7)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].change_type, ChangeType::Updated);
        assert_eq!(records[0].snapshot["title"], "b");
        assert_eq!(records[0].changed_by_id, None);
        assert_eq!(records[1].change_type, ChangeType::Created);
    }
}
