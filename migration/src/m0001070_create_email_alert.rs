use crate::m0001020_create_vulnerability::Vulnerability;
use sea_orm_migration::{prelude::*, sea_query::extension::postgres::Type};

#[derive(DeriveMigrationName)]
pub struct Migration;

fn type_values() -> Vec<Alias> {
    ["kev", "high_epss"].into_iter().map(Alias::new).collect()
}

fn status_values() -> Vec<Alias> {
    ["pending", "sent", "failed"]
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
                    .as_enum(AlertTypeEnum)
                    .values(type_values())
                    .to_owned(),
            )
            .await?;

        manager
            .create_type(
                Type::create()
                    .as_enum(EmailAlertStatusEnum)
                    .values(status_values())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailAlert::Table)
                    .col(
                        ColumnDef::new(EmailAlert::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmailAlert::VulnerabilityId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailAlert::AlertType)
                            .enumeration(AlertTypeEnum, type_values())
                            .not_null(),
                    )
                    .col(ColumnDef::new(EmailAlert::Recipient).string().not_null())
                    .col(
                        ColumnDef::new(EmailAlert::Status)
                            .enumeration(EmailAlertStatusEnum, status_values())
                            .not_null(),
                    )
                    .col(ColumnDef::new(EmailAlert::Error).text())
                    .col(
                        ColumnDef::new(EmailAlert::SentViaDigest)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(EmailAlert::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EmailAlert::SentAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .from_col(EmailAlert::VulnerabilityId)
                            .to(Vulnerability::Table, Vulnerability::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // at most one non-failed alert per (vulnerability, type, recipient)
        manager
            .get_connection()
            .execute_unprepared(
                r#"
CREATE UNIQUE INDEX email_alert_dedup_idx
    ON email_alert (vulnerability_id, alert_type, recipient)
    WHERE status <> 'failed'
"#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailAlert::Table).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(AlertTypeEnum).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(EmailAlertStatusEnum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "alert_type")]
pub struct AlertTypeEnum;

#[derive(DeriveIden)]
#[sea_orm(iden = "email_alert_status")]
pub struct EmailAlertStatusEnum;

#[derive(DeriveIden)]
pub enum EmailAlert {
    Table,
    Id,
    VulnerabilityId,
    AlertType,
    Recipient,
    Status,
    Error,
    SentViaDigest,
    CreatedAt,
    SentAt,
}
