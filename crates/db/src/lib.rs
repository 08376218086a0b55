use std::time::Duration;

use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;

pub use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};

pub mod entities;
pub mod models;
pub mod seed;
pub mod types;

pub type DbPool = DatabaseConnection;

#[derive(Clone)]
pub struct DBService {
    pub pool: DbPool,
}

impl DBService {
    /// Connects and brings the schema up to date.
    pub async fn new(database_url: &str) -> Result<DBService, DbErr> {
        let mut options = ConnectOptions::new(database_url.to_owned());
        options
            .acquire_timeout(Duration::from_secs(30))
            .sqlx_logging(false);

        let pool = Database::connect(options).await?;
        db_migration::Migrator::up(&pool, None).await?;
        tracing::debug!("Database migrations applied");
        Ok(DBService { pool })
    }

    pub async fn new_in_memory() -> Result<DBService, DbErr> {
        Self::new("sqlite::memory:").await
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::{
        DBService, DbPool,
        models::user::{CreateUser, User},
    };

    pub async fn setup_db() -> DbPool {
        DBService::new_in_memory().await.unwrap().pool
    }

    pub async fn create_user(db: &DbPool, username: &str) -> User {
        User::create(
            db,
            &CreateUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                first_name: String::new(),
                last_name: String::new(),
                is_superuser: false,
            },
        )
        .await
        .unwrap()
        .0
    }
}
