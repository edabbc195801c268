use sea_orm_migration::{prelude::*, sea_query::extension::postgres::Type};

#[derive(DeriveMigrationName)]
pub struct Migration;

fn source_values() -> Vec<Alias> {
    ["external_catalog", "custom"]
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
                    .as_enum(ProductSourceEnum)
                    .values(source_values())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Product::Table)
                    .col(
                        ColumnDef::new(Product::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Product::Vendor).string().not_null())
                    .col(ColumnDef::new(Product::Name).string().not_null())
                    .col(ColumnDef::new(Product::Version).string())
                    .col(ColumnDef::new(Product::CpeUri).string().unique_key())
                    .col(ColumnDef::new(Product::Description).text())
                    .col(
                        ColumnDef::new(Product::Source)
                            .enumeration(ProductSourceEnum, source_values())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Product::Monitored)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Product::Deprecated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Product::LastSyncedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Product::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // custom entries must be unique per tuple; catalog entries are keyed
        // by their CPE URI instead
        manager
            .get_connection()
            .execute_unprepared(
                r#"
CREATE UNIQUE INDEX product_custom_tuple_idx
    ON product (vendor, name, coalesce(version, ''), source)
    WHERE source = 'custom'
"#,
            )
            .await?;

        // full-text companion: generated column plus GIN index, kept
        // consistent with the row by the database itself
        manager
            .get_connection()
            .execute_unprepared(
                r#"
ALTER TABLE product ADD COLUMN textsearch tsvector
    GENERATED ALWAYS AS (
        to_tsvector('english', vendor || ' ' || name || ' ' || coalesce(description, ''))
    ) STORED
"#,
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX product_textsearch_idx ON product USING GIN (textsearch)",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Product::Table).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(ProductSourceEnum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "product_source")]
pub struct ProductSourceEnum;

#[derive(DeriveIden)]
pub enum Product {
    Table,
    Id,
    Vendor,
    Name,
    Version,
    CpeUri,
    Description,
    Source,
    Monitored,
    Deprecated,
    LastSyncedAt,
    CreatedAt,
}
