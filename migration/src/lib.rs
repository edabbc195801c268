pub use sea_orm_migration::prelude::*;

mod m0001010_create_source;
mod m0001020_create_vulnerability;
mod m0001030_create_raw_entry;
mod m0001040_create_product;
mod m0001050_create_vulnerability_product;
mod m0001060_create_review_queue;
mod m0001070_create_email_alert;
mod m0001080_create_sync_log;
mod m0001090_create_setting;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m0001010_create_source::Migration),
            Box::new(m0001020_create_vulnerability::Migration),
            Box::new(m0001030_create_raw_entry::Migration),
            Box::new(m0001040_create_product::Migration),
            Box::new(m0001050_create_vulnerability_product::Migration),
            Box::new(m0001060_create_review_queue::Migration),
            Box::new(m0001070_create_email_alert::Migration),
            Box::new(m0001080_create_sync_log::Migration),
            Box::new(m0001090_create_setting::Migration),
        ]
    }
}
