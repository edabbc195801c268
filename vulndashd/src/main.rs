mod db;

use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use vulndash_common::{config, db::Database};
use vulndash_server::Server;

#[derive(Parser, Debug)]
#[command(name = "vulndashd", about = "Vulnerability intelligence aggregator", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the API server and all background jobs
    Api(Api),
    /// Database management
    Db(db::Run),
}

#[derive(clap::Args, Debug)]
struct Api {
    #[command(flatten)]
    database: config::Database,
    #[command(flatten)]
    http: config::Http,
    /// Apply pending migrations before serving
    #[arg(long, default_value_t = false)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    vulndash_common::tracing::init("vulndashd");

    match cli.command {
        Command::Api(api) => api.run().await,
        Command::Db(run) => run.run().await,
    }
}

impl Api {
    async fn run(self) -> anyhow::Result<ExitCode> {
        let db = Database::new(&self.database).await?;

        if self.migrate {
            db::migrate(&db).await?;
        }

        let cancel = CancellationToken::new();

        // terminate cleanly: loops return in-flight work and drain
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("shutdown requested");
                    cancel.cancel();
                }
            });
        }

        Server::new(db, self.http, cancel)?.run().await?;

        Ok(ExitCode::SUCCESS)
    }
}
