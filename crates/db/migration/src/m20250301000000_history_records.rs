use sea_orm_migration::{prelude::*, sea_orm::DatabaseBackend};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(HistoryRecords::Table)
                    .col(pk_id_col(manager, HistoryRecords::Id))
                    .col(
                        ColumnDef::new(HistoryRecords::EntityType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(id_col(manager, HistoryRecords::EntityId).not_null().to_owned())
                    .col(
                        ColumnDef::new(HistoryRecords::ChangeType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(HistoryRecords::Snapshot).json().not_null())
                    // No foreign key: history outlives the users it mentions.
                    .col(id_col(manager, HistoryRecords::ChangedById))
                    .col(
                        ColumnDef::new(HistoryRecords::ChangedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_history_records_entity")
                    .table(HistoryRecords::Table)
                    .col(HistoryRecords::EntityType)
                    .col(HistoryRecords::EntityId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_history_records_entity")
                    .table(HistoryRecords::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(HistoryRecords::Table).to_owned())
            .await?;
        Ok(())
    }
}

fn pk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = id_col(manager, col);
    col.not_null().auto_increment().primary_key().to_owned()
}

fn id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.to_owned()
}

#[derive(Iden)]
enum HistoryRecords {
    Table,
    Id,
    EntityType,
    EntityId,
    ChangeType,
    Snapshot,
    ChangedById,
    ChangedAt,
}
