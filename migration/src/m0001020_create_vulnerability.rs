use sea_orm_migration::{prelude::*, sea_query::extension::postgres::Type};

#[derive(DeriveMigrationName)]
pub struct Migration;

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
                    .as_enum(SeverityEnum)
                    .values(severity_values())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Vulnerability::Table)
                    .col(
                        ColumnDef::new(Vulnerability::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Vulnerability::Title).text())
                    .col(ColumnDef::new(Vulnerability::Description).text())
                    .col(ColumnDef::new(Vulnerability::Vendor).string())
                    .col(ColumnDef::new(Vulnerability::Product).string())
                    .col(
                        ColumnDef::new(Vulnerability::Severity)
                            .enumeration(SeverityEnum, severity_values())
                            .not_null(),
                    )
                    .col(ColumnDef::new(Vulnerability::CvssScore).double())
                    .col(ColumnDef::new(Vulnerability::CvssVector).string())
                    .col(ColumnDef::new(Vulnerability::EpssScore).double())
                    .col(ColumnDef::new(Vulnerability::EpssPercentile).double())
                    .col(
                        ColumnDef::new(Vulnerability::Kev)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Vulnerability::KevSince).timestamp_with_time_zone())
                    .col(ColumnDef::new(Vulnerability::PublishedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Vulnerability::RemediatedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Vulnerability::Confidence)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Vulnerability::ExtractionProvider).string())
                    .col(ColumnDef::new(Vulnerability::ExtractionModel).string())
                    .col(
                        ColumnDef::new(Vulnerability::FallbackAttempt)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Vulnerability::ValidationWarnings)
                            .json_binary()
                            .not_null()
                            .default(serde_json::json!([])),
                    )
                    .col(
                        ColumnDef::new(Vulnerability::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Vulnerability::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(Vulnerability::Table)
                    .name("vulnerability_kev_idx")
                    .col(Vulnerability::Kev)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(Vulnerability::Table)
                    .name("vulnerability_published_idx")
                    .col(Vulnerability::PublishedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Vulnerability::Table).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(SeverityEnum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "severity")]
pub struct SeverityEnum;

#[derive(DeriveIden)]
pub enum Vulnerability {
    Table,
    Id,
    Title,
    Description,
    Vendor,
    Product,
    Severity,
    CvssScore,
    CvssVector,
    EpssScore,
    EpssPercentile,
    Kev,
    KevSince,
    PublishedAt,
    RemediatedAt,
    Confidence,
    ExtractionProvider,
    ExtractionModel,
    FallbackAttempt,
    ValidationWarnings,
    CreatedAt,
    UpdatedAt,
}
