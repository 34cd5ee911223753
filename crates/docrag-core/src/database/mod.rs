pub mod repository;

pub use repository::Repository;

use std::time::Duration;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::info;

use crate::config::Settings;
use crate::error::Result;

/// Connection pool over sqlx's Any driver: `DATABASE_URL` selects a SQL
/// server, otherwise an embedded SQLite file under the local storage root.
/// All repository SQL is written portably (`$n` binds, TEXT/BIGINT types)
/// so both backends run the same statements.
#[derive(Clone)]
pub struct DbPool {
    pool: AnyPool,
}

impl DbPool {
    pub async fn connect(settings: &Settings) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let url = settings.effective_database_url();
        if let Some(path) = sqlite_file_path(&url) {
            if let Some(parent) = std::path::Path::new(&path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!(
            backend = if settings.database_url.is_some() { "sql-server" } else { "sqlite" },
            "repository adapter: sqlx"
        );

        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&url)
            .await?;

        // Fail fast on an unreachable database.
        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    pub fn inner(&self) -> &AnyPool {
        &self.pool
    }
}

fn sqlite_file_path(url: &str) -> Option<String> {
    let rest = url.strip_prefix("sqlite://")?;
    if rest.starts_with(":memory:") {
        return None;
    }
    Some(rest.split('?').next().unwrap_or(rest).to_string())
}
