use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Source::Table)
                    .col(
                        ColumnDef::new(Source::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Source::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Source::Configuration)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Source::Revision).uuid().not_null())
                    .col(ColumnDef::new(Source::LastRun).timestamp_with_time_zone())
                    .col(ColumnDef::new(Source::LastSuccess).timestamp_with_time_zone())
                    .col(ColumnDef::new(Source::LastError).text())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Source::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
pub enum Source {
    Table,
    Id,
    Name,
    Configuration,
    Revision,
    LastRun,
    LastSuccess,
    LastError,
}
