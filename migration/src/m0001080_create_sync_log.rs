use sea_orm_migration::{prelude::*, sea_query::extension::postgres::Type};

#[derive(DeriveMigrationName)]
pub struct Migration;

fn status_values() -> Vec<Alias> {
    ["running", "succeeded", "failed"]
        .into_iter()
        .map(Alias::new)
        .collect()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(SyncStatusEnum)
                    .values(status_values())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SyncLog::Table)
                    .col(ColumnDef::new(SyncLog::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(SyncLog::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SyncLog::FinishedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(SyncLog::Status)
                            .enumeration(SyncStatusEnum, status_values())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SyncLog::Added)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncLog::Updated)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncLog::Deprecated)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncLog::Failed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SyncLog::Error).text())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncLog::Table).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(SyncStatusEnum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_status")]
pub struct SyncStatusEnum;

#[derive(DeriveIden)]
pub enum SyncLog {
    Table,
    Id,
    StartedAt,
    FinishedAt,
    Status,
    Added,
    Updated,
    Deprecated,
    Failed,
    Error,
}
