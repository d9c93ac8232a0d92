use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Expected row count per source table after the demo seed is applied.
const SEED_TABLES: &[(&str, i64)] = &[
    ("closed_deals", 6),
    ("pipeline_snapshots", 9),
    ("contract_mappings", 9),
    ("sub_category_attributions", 14),
    ("category_mappings", 4),
    ("sales_roster", 5),
    ("quotas", 10),
    ("historical_performance", 5),
];

const SEED_SNAPSHOT_MONTHS: &[&str] = &["2026-05", "2026-06"];

/// Deterministic demo ledgers.
///
/// Two regions with one manager each, won deals across 2025 and 2026, two
/// consecutive pipeline snapshots that exercise every movement bucket, and
/// authoritative 2025 performance rows.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Applies the seed. Rows are upserted, so loading twice is harmless.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let tables = SEED_TABLES
            .iter()
            .map(|(table, rows)| TableSeedInfo { table: *table, rows: *rows })
            .collect::<Vec<_>>();

        tracing::info!(
            event_name = "db.fixtures.demo_loaded",
            tables = tables.len(),
            "demo dataset seeded"
        );
        Ok(SeedResult { tables })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (table, expected) in SEED_TABLES {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table}"))
                .fetch_one(pool)
                .await?;
            checks.push((*table, count == *expected));
        }

        for month in SEED_SNAPSHOT_MONTHS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM pipeline_snapshots WHERE snapshot_month = ?1)",
            )
            .bind(*month)
            .fetch_one(pool)
            .await?;
            checks.push(("snapshot-month", present == 1));
        }

        let orphaned_reports: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM sales_roster r
             WHERE r.manager_id IS NOT NULL
               AND NOT EXISTS (SELECT 1 FROM sales_roster m WHERE m.id = r.manager_id)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("roster-managers-resolve", orphaned_reports == 0));

        let unmapped_sub_categories: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM sub_category_attributions a
             WHERE NOT EXISTS (SELECT 1 FROM category_mappings c
                               WHERE c.sub_category = a.sub_category)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("sub-categories-mapped", unmapped_sub_categories == 0));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub tables: Vec<TableSeedInfo>,
}

#[derive(Debug)]
pub struct TableSeedInfo {
    pub table: &'static str,
    pub rows: i64,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
