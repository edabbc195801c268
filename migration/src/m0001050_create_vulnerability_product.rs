use crate::m0001020_create_vulnerability::Vulnerability;
use crate::m0001040_create_product::Product;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VulnerabilityProduct::Table)
                    .col(
                        ColumnDef::new(VulnerabilityProduct::VulnerabilityId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VulnerabilityProduct::ProductId)
                            .uuid()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(VulnerabilityProduct::VulnerabilityId)
                            .col(VulnerabilityProduct::ProductId)
                            .primary(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from_col(VulnerabilityProduct::VulnerabilityId)
                            .to(Vulnerability::Table, Vulnerability::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from_col(VulnerabilityProduct::ProductId)
                            .to(Product::Table, Product::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VulnerabilityProduct::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
pub enum VulnerabilityProduct {
    Table,
    VulnerabilityId,
    ProductId,
}
