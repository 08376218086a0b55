pub mod health;
pub mod priorities;
pub mod projects;
pub mod statuses;
pub mod tags;
pub mod tasks;
pub mod users;
