use crate::m0001010_create_source::Source;
use crate::m0001020_create_vulnerability::Vulnerability;
use sea_orm_migration::{prelude::*, sea_query::extension::postgres::Type};

#[derive(DeriveMigrationName)]
pub struct Migration;

fn status_values() -> Vec<Alias> {
    [
        "pending",
        "in_progress",
        "processed",
        "needs_review",
        "failed",
        "skipped",
    ]
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
                    .as_enum(RawEntryStatusEnum)
                    .values(status_values())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RawEntry::Table)
                    .col(
                        ColumnDef::new(RawEntry::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RawEntry::SourceId).uuid().not_null())
                    .col(ColumnDef::new(RawEntry::Text).text().not_null())
                    .col(
                        ColumnDef::new(RawEntry::FetchedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawEntry::Status)
                            .enumeration(RawEntryStatusEnum, status_values())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawEntry::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(RawEntry::NextAttemptAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(RawEntry::TerminalAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(RawEntry::LastError).text())
                    .col(ColumnDef::new(RawEntry::VulnerabilityId).string())
                    .foreign_key(
                        ForeignKey::create()
                            .from_col(RawEntry::SourceId)
                            .to(Source::Table, Source::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from_col(RawEntry::VulnerabilityId)
                            .to(Vulnerability::Table, Vulnerability::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // the scheduler scans for due pending entries
        manager
            .create_index(
                Index::create()
                    .table(RawEntry::Table)
                    .name("raw_entry_status_idx")
                    .col(RawEntry::Status)
                    .col(RawEntry::NextAttemptAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RawEntry::Table).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(RawEntryStatusEnum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "raw_entry_status")]
pub struct RawEntryStatusEnum;

#[derive(DeriveIden)]
pub enum RawEntry {
    Table,
    Id,
    SourceId,
    Text,
    FetchedAt,
    Status,
    Attempts,
    NextAttemptAt,
    TerminalAt,
    LastError,
    VulnerabilityId,
}
