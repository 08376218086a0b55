use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Entities whose writes are captured in `history_records`.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TrackedEntity {
    #[sea_orm(string_value = "priority")]
    Priority,
    #[sea_orm(string_value = "status")]
    Status,
    #[sea_orm(string_value = "tag")]
    Tag,
    #[sea_orm(string_value = "project")]
    Project,
    #[sea_orm(string_value = "task")]
    Task,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeType {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "updated")]
    Updated,
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn change_type_string_forms_agree() {
        for change in [ChangeType::Created, ChangeType::Updated, ChangeType::Deleted] {
            let display = change.to_string();
            let json = serde_json::to_value(change).unwrap();
            assert_eq!(json, serde_json::Value::String(display.clone()));
            assert_eq!(ChangeType::from_str(&display).unwrap(), change);
        }
    }
}
