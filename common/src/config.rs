/// Database configuration
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Database")]
pub struct Database {
    #[arg(id = "db-url", long, env = "VULNDASH_DB_URL")]
    pub url: Option<String>,
    #[arg(id = "db-host", long, env = "VULNDASH_DB_HOST", default_value = "localhost")]
    pub host: String,
    #[arg(id = "db-port", long, env = "VULNDASH_DB_PORT", default_value_t = 5432)]
    pub port: u16,
    #[arg(id = "db-name", long, env = "VULNDASH_DB_NAME", default_value = "vulndash")]
    pub name: String,
    #[arg(id = "db-user", long, env = "VULNDASH_DB_USER", default_value = "postgres")]
    pub username: String,
    #[arg(id = "db-password", long, env = "VULNDASH_DB_PASSWORD", default_value = "postgres")]
    pub password: String,
}

impl Database {
    /// Build the connection URL, preferring an explicitly provided one.
    pub fn to_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.username, self.password, self.host, self.port, self.name
            ),
        }
    }
}

/// HTTP server configuration
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "HTTP")]
pub struct Http {
    #[arg(long, env = "VULNDASH_BIND", default_value = "[::]:8080")]
    pub bind: String,
}
