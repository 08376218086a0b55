pub mod history;
pub mod page;
pub mod priority;
pub mod project;
pub mod status;
pub mod tag;
pub mod task;
pub mod task_filters;
pub mod user;
pub mod validation;
