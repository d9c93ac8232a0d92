use std::fs;
use std::path::Path;

use salescope_db::{
    DbPool, DemoDataset, InMemorySourceRepository, SourceRepository, SqlSourceRepository,
    TableSeedInfo,
};

use crate::commands::{open_migrated_pool, CommandOptions, CommandResult, StepFailure};

/// Seeds the configured database with the demo ledgers, or replaces its
/// contents with a JSON export when `from` is given.
pub fn run(options: &CommandOptions, from: Option<&Path>) -> CommandResult {
    let (config, runtime) = match options.prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let outcome = runtime.block_on(async {
        let pool = open_migrated_pool(&config.database).await?;
        let seeded = match from {
            Some(path) => import_export(&pool, path).await,
            None => seed_demo(&pool).await,
        };
        pool.close().await;
        seeded
    });
    CommandResult::from_step("seed", outcome)
}

async fn seed_demo(pool: &DbPool) -> Result<String, StepFailure> {
    let seed_result = DemoDataset::load(pool)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

    let verification = DemoDataset::verify(pool)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

    if !verification.all_present {
        return Err(("seed_verification", verification_failure_message(&verification.checks), 6));
    }

    Ok(format!("demo dataset loaded: {}", describe_tables(&seed_result.tables)))
}

async fn import_export(pool: &DbPool, path: &Path) -> Result<String, StepFailure> {
    let raw = fs::read_to_string(path).map_err(|error| {
        ("seed_source", format!("could not read `{}`: {error}", path.display()), 5u8)
    })?;
    let dataset = InMemorySourceRepository::from_json(&raw)
        .map_err(|error| ("seed_source", error.to_string(), 5u8))?
        .load_dataset()
        .await
        .map_err(|error| ("seed_source", error.to_string(), 5u8))?;

    SqlSourceRepository::new(pool.clone())
        .import(&dataset)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

    Ok(format!(
        "imported `{}`: {} closed deals, {} pipeline snapshot rows",
        path.display(),
        dataset.closed_deals.len(),
        dataset.pipeline_snapshots.len()
    ))
}

fn describe_tables(tables: &[TableSeedInfo]) -> String {
    tables.iter().map(|info| format!("{}={}", info.table, info.rows)).collect::<Vec<_>>().join(", ")
}

fn verification_failure_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
