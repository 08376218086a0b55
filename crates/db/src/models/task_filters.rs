//! Row predicates over `tasks`. Every function is pure: the clock is passed in
//! so the shortcuts can be exercised against fixed instants.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use sea_orm::{
    ColumnTrait, Condition,
    sea_query::{Query, SelectStatement},
};

use super::status::{CANCELLED, COMPLETED, IN_PROGRESS};
use crate::entities::{priority, project, status, task};

/// Priorities at or above this level count as urgent.
pub const URGENT_LEVEL: i32 = 4;

fn status_ids_named(names: &[&str]) -> SelectStatement {
    Query::select()
        .column(status::Column::Id)
        .from(status::Entity)
        .and_where(status::Column::Name.is_in(names.iter().copied()))
        .to_owned()
}

fn priority_ids_where(condition: Condition) -> SelectStatement {
    Query::select()
        .column(priority::Column::Id)
        .from(priority::Entity)
        .cond_where(condition)
        .to_owned()
}

/// Owner of the project, assignee or creator.
pub fn visible_to(user_id: i64) -> Condition {
    let owned_projects = Query::select()
        .column(project::Column::Id)
        .from(project::Entity)
        .and_where(project::Column::OwnerId.eq(user_id))
        .to_owned();
    Condition::any()
        .add(task::Column::ProjectId.in_subquery(owned_projects))
        .add(task::Column::AssignedToId.eq(user_id))
        .add(task::Column::CreatedById.eq(user_id))
}

/// A task without a status is not completed.
pub fn not_completed() -> Condition {
    Condition::any()
        .add(task::Column::StatusId.is_null())
        .add(task::Column::StatusId.not_in_subquery(status_ids_named(&[COMPLETED])))
}

pub fn with_priority_level(level: i32) -> Condition {
    Condition::all().add(task::Column::PriorityId.in_subquery(priority_ids_where(
        Condition::all().add(priority::Column::Level.eq(level)),
    )))
}

/// `now <= due_date <= now + 7 days`.
pub fn upcoming_week(now: DateTime<Utc>) -> Condition {
    Condition::all()
        .add(task::Column::DueDate.gte(now))
        .add(task::Column::DueDate.lte(now + Duration::days(7)))
}

pub fn overdue(now: DateTime<Utc>) -> Condition {
    Condition::all()
        .add(task::Column::DueDate.lt(now))
        .add(not_completed())
}

/// Midnight UTC of the day after `now`.
pub fn tomorrow_start(now: DateTime<Utc>) -> DateTime<Utc> {
    (now + Duration::days(1))
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// Urgent and still open, or due at some point tomorrow.
pub fn urgent_or_tomorrow(now: DateTime<Utc>) -> Condition {
    let start = tomorrow_start(now);
    let urgent = task::Column::PriorityId.in_subquery(priority_ids_where(
        Condition::all().add(priority::Column::Level.gte(URGENT_LEVEL)),
    ));
    Condition::any()
        .add(Condition::all().add(urgent).add(not_completed()))
        .add(
            Condition::all()
                .add(task::Column::DueDate.gte(start))
                .add(task::Column::DueDate.lt(start + Duration::days(1))),
        )
}

/// Tasks someone else created (or nobody did) that are in progress or cancelled.
pub fn others_in_progress_or_cancelled(user_id: i64) -> Condition {
    Condition::all()
        .add(
            Condition::any()
                .add(task::Column::CreatedById.is_null())
                .add(task::Column::CreatedById.ne(user_id)),
        )
        .add(task::Column::StatusId.in_subquery(status_ids_named(&[IN_PROGRESS, CANCELLED])))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn tomorrow_starts_at_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 22, 15, 0).unwrap();
        assert_eq!(
            tomorrow_start(now),
            Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()
        );
    }
}
