use crate::config;
use sea_orm::{ConnectOptions, ConnectionTrait, DatabaseConnection, DbErr, Statement};
use std::{ops::Deref, time::Duration};
use tracing::instrument;

/// A handle to the backing database.
///
/// Derefs to the underlying [`DatabaseConnection`], so transactions can be
/// opened with `db.begin()` and read paths may use the connection directly.
#[derive(Clone, Debug)]
pub struct Database {
    db: DatabaseConnection,
}

impl Database {
    #[instrument(err)]
    pub async fn new(database: &config::Database) -> Result<Self, anyhow::Error> {
        let url = database.to_url();

        let mut opts = ConnectOptions::new(url);
        opts.connect_timeout(Duration::from_secs(10))
            .min_connections(2)
            .max_connections(10)
            .sqlx_logging_level(log::LevelFilter::Trace);

        let db = sea_orm::Database::connect(opts).await?;

        Ok(Self { db })
    }

    /// Run a trivial query to check database liveness.
    pub async fn ping(&self) -> Result<(), DbErr> {
        self.db
            .query_one(Statement::from_string(
                self.db.get_database_backend(),
                "SELECT 1",
            ))
            .await?;

        Ok(())
    }

    pub async fn close(self) -> Result<(), DbErr> {
        self.db.close().await
    }
}

impl Deref for Database {
    type Target = DatabaseConnection;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

impl From<DatabaseConnection> for Database {
    fn from(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Classification of database errors the services care about.
pub trait DatabaseErrors {
    /// `true` if the error indicates a unique constraint violation
    fn is_duplicate(&self) -> bool;
}

impl DatabaseErrors for DbErr {
    fn is_duplicate(&self) -> bool {
        match self {
            DbErr::Query(sea_orm::RuntimeErr::SqlxError(err)) => err
                .as_database_error()
                .and_then(|err| err.code())
                // PostgreSQL: unique_violation
                .is_some_and(|code| code == "23505"),
            _ => false,
        }
    }
}
