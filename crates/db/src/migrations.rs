use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await?;
    tracing::debug!(
        event_name = "db.migrations.applied",
        migrations = MIGRATOR.iter().count(),
        "source schema is up to date"
    );
    Ok(())
}
