use migration::Migrator;
use sea_orm_migration::MigratorTrait;
use std::process::ExitCode;
use vulndash_common::{config, db::Database};

#[derive(clap::Args, Debug)]
pub struct Run {
    #[command(subcommand)]
    command: Command,
    #[command(flatten)]
    database: config::Database,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Run migrations (up)
    Migrate,
    /// Remove all migrations and re-apply them (DANGER)
    Refresh,
}

impl Run {
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        let db = Database::new(&self.database).await?;

        match self.command {
            Command::Migrate => migrate(&db).await?,
            Command::Refresh => refresh(&db).await?,
        }

        Ok(ExitCode::SUCCESS)
    }
}

pub async fn migrate(db: &Database) -> anyhow::Result<()> {
    log::debug!("applying migrations");
    Migrator::up(&**db, None).await?;
    log::debug!("applied migrations");

    Ok(())
}

async fn refresh(db: &Database) -> anyhow::Result<()> {
    log::warn!("refreshing database schema...");
    Migrator::refresh(&**db).await?;
    log::warn!("refreshing database schema... done!");

    Ok(())
}
