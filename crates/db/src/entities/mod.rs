pub mod history_record;
pub mod priority;
pub mod project;
pub mod status;
pub mod tag;
pub mod task;
pub mod task_tag;
pub mod user;
