use crate::m0001020_create_vulnerability::SeverityEnum;
use crate::m0001030_create_raw_entry::RawEntry;
use sea_orm_migration::{prelude::*, sea_query::extension::postgres::Type};

#[derive(DeriveMigrationName)]
pub struct Migration;

fn decision_values() -> Vec<Alias> {
    ["pending", "approved", "rejected"]
        .into_iter()
        .map(Alias::new)
        .collect()
}

fn severity_values() -> Vec<Alias> {
    ["critical", "high", "medium", "low", "none", "unknown"]
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
                    .as_enum(ReviewDecisionEnum)
                    .values(decision_values())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReviewQueueItem::Table)
                    .col(
                        ColumnDef::new(ReviewQueueItem::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReviewQueueItem::RawEntryId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(ReviewQueueItem::CveId).string())
                    .col(ColumnDef::new(ReviewQueueItem::Title).text())
                    .col(ColumnDef::new(ReviewQueueItem::Description).text())
                    .col(ColumnDef::new(ReviewQueueItem::Vendor).string())
                    .col(ColumnDef::new(ReviewQueueItem::Product).string())
                    .col(
                        ColumnDef::new(ReviewQueueItem::Severity)
                            .enumeration(SeverityEnum, severity_values())
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReviewQueueItem::CvssScore).double())
                    .col(ColumnDef::new(ReviewQueueItem::CvssVector).string())
                    .col(
                        ColumnDef::new(ReviewQueueItem::Confidence)
                            .double()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReviewQueueItem::ExtractionProvider).string())
                    .col(ColumnDef::new(ReviewQueueItem::ExtractionModel).string())
                    .col(
                        ColumnDef::new(ReviewQueueItem::FallbackAttempt)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ReviewQueueItem::ValidationWarnings)
                            .json_binary()
                            .not_null()
                            .default(serde_json::json!([])),
                    )
                    .col(
                        ColumnDef::new(ReviewQueueItem::Decision)
                            .enumeration(ReviewDecisionEnum, decision_values())
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReviewQueueItem::DecidedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ReviewQueueItem::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from_col(ReviewQueueItem::RawEntryId)
                            .to(RawEntry::Table, RawEntry::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReviewQueueItem::Table).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(ReviewDecisionEnum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "review_decision")]
pub struct ReviewDecisionEnum;

#[derive(DeriveIden)]
pub enum ReviewQueueItem {
    Table,
    Id,
    RawEntryId,
    CveId,
    Title,
    Description,
    Vendor,
    Product,
    Severity,
    CvssScore,
    CvssVector,
    Confidence,
    ExtractionProvider,
    ExtractionModel,
    FallbackAttempt,
    ValidationWarnings,
    Decision,
    DecidedAt,
    CreatedAt,
}
