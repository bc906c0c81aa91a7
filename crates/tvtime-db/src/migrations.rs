use crate::connection::Database;
use crate::error::Result;
use sqlx::migrate::Migrator;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

impl Database {
    pub(crate) async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");
        MIGRATOR.run(self.pool()).await?;
        info!("Database migrations completed successfully");

        Ok(())
    }
}
