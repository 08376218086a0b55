use sea_orm::JsonValue;
use sea_orm::entity::prelude::*;

use crate::types::{ChangeType, TrackedEntity};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "history_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub entity_type: TrackedEntity,
    pub entity_id: i64,
    pub change_type: ChangeType,
    pub snapshot: JsonValue,
    pub changed_by_id: Option<i64>,
    pub changed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
