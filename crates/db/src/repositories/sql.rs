use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use salescope_core::domain::source::{
    CategoryMappingRecord, ClosedDealRecord, ContractMappingRecord, HistoricalPerformanceRecord,
    PipelineSnapshotRecord, QuotaRecord, SalesRosterRecord, SourceDataset,
    SubCategoryAttributionRecord,
};

use super::{RepositoryError, SourceRepository};
use crate::DbPool;

pub struct SqlSourceRepository {
    pool: DbPool,
}

impl SqlSourceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Replaces every source table with the contents of `dataset` in one
    /// transaction.
    pub async fn import(&self, dataset: &SourceDataset) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for table in [
            "closed_deals",
            "pipeline_snapshots",
            "contract_mappings",
            "sub_category_attributions",
            "category_mappings",
            "sales_roster",
            "quotas",
            "historical_performance",
        ] {
            sqlx::query(&format!("DELETE FROM {table}")).execute(&mut *tx).await?;
        }

        for deal in &dataset.closed_deals {
            sqlx::query(
                "INSERT INTO closed_deals (deal_id, deal_name, account_name, contract_id, region,
                                           vertical, segment, logo_type, owner, sold_by,
                                           license_value, implementation_value, close_date,
                                           created_date)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&deal.deal_id)
            .bind(&deal.deal_name)
            .bind(&deal.account_name)
            .bind(&deal.contract_id)
            .bind(&deal.region)
            .bind(&deal.vertical)
            .bind(&deal.segment)
            .bind(&deal.logo_type)
            .bind(&deal.owner)
            .bind(&deal.sold_by)
            .bind(deal.license_value.to_string())
            .bind(deal.implementation_value.to_string())
            .bind(&deal.close_date)
            .bind(&deal.created_date)
            .execute(&mut *tx)
            .await?;
        }

        for row in &dataset.pipeline_snapshots {
            sqlx::query(
                "INSERT INTO pipeline_snapshots (deal_id, deal_name, account_name, contract_id,
                                                 snapshot_month, stage, probability, deal_value,
                                                 license_value, implementation_value,
                                                 expected_close_date, created_date, region,
                                                 vertical, segment, logo_type, owner, sold_by)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.deal_id)
            .bind(&row.deal_name)
            .bind(&row.account_name)
            .bind(&row.contract_id)
            .bind(&row.snapshot_month)
            .bind(&row.stage)
            .bind(row.probability.to_string())
            .bind(row.deal_value.to_string())
            .bind(row.license_value.to_string())
            .bind(row.implementation_value.to_string())
            .bind(&row.expected_close_date)
            .bind(&row.created_date)
            .bind(&row.region)
            .bind(&row.vertical)
            .bind(&row.segment)
            .bind(&row.logo_type)
            .bind(&row.owner)
            .bind(&row.sold_by)
            .execute(&mut *tx)
            .await?;
        }

        for mapping in &dataset.contract_mappings {
            sqlx::query(
                "INSERT OR REPLACE INTO contract_mappings (contract_id, region, vertical, segment,
                                                           revenue_type)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&mapping.contract_id)
            .bind(&mapping.region)
            .bind(&mapping.vertical)
            .bind(&mapping.segment)
            .bind(&mapping.revenue_type)
            .execute(&mut *tx)
            .await?;
        }

        for attribution in &dataset.sub_category_attributions {
            sqlx::query(
                "INSERT OR REPLACE INTO sub_category_attributions (contract_id, year, sub_category,
                                                                   percentage)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&attribution.contract_id)
            .bind(attribution.year)
            .bind(&attribution.sub_category)
            .bind(attribution.percentage.to_string())
            .execute(&mut *tx)
            .await?;
        }

        for mapping in &dataset.category_mappings {
            sqlx::query(
                "INSERT OR REPLACE INTO category_mappings (sub_category, category) VALUES (?, ?)",
            )
            .bind(&mapping.sub_category)
            .bind(&mapping.category)
            .execute(&mut *tx)
            .await?;
        }

        for member in &dataset.sales_roster {
            sqlx::query(
                "INSERT OR REPLACE INTO sales_roster (id, name, region, is_manager, manager_id)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&member.id)
            .bind(&member.name)
            .bind(&member.region)
            .bind(member.is_manager)
            .bind(&member.manager_id)
            .execute(&mut *tx)
            .await?;
        }

        for quota in &dataset.quotas {
            sqlx::query(
                "INSERT OR REPLACE INTO quotas (salesperson_id, year, quota) VALUES (?, ?, ?)",
            )
            .bind(&quota.salesperson_id)
            .bind(quota.year)
            .bind(quota.quota.to_string())
            .execute(&mut *tx)
            .await?;
        }

        for row in &dataset.historical_performance {
            let monthly_closed_json = row
                .monthly_closed
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;

            sqlx::query(
                "INSERT OR REPLACE INTO historical_performance (year, salesperson_id, name, region,
                                                                quota, closed,
                                                                previous_year_closed, pipeline,
                                                                unweighted_pipeline, forecast,
                                                                monthly_closed_json)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(row.year)
            .bind(&row.salesperson_id)
            .bind(&row.name)
            .bind(&row.region)
            .bind(row.quota.to_string())
            .bind(row.closed.to_string())
            .bind(row.previous_year_closed.to_string())
            .bind(row.pipeline.to_string())
            .bind(row.unweighted_pipeline.to_string())
            .bind(row.forecast.to_string())
            .bind(monthly_closed_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            event_name = "db.source.imported",
            closed_deals = dataset.closed_deals.len(),
            pipeline_snapshots = dataset.pipeline_snapshots.len(),
            "source tables replaced"
        );
        Ok(())
    }
}

fn text(row: &SqliteRow, column: &str) -> Result<String, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn optional_text(row: &SqliteRow, column: &str) -> Result<Option<String>, RepositoryError> {
    let value: Option<String> =
        row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(value.filter(|value| !value.trim().is_empty()))
}

fn year(row: &SqliteRow, column: &str) -> Result<i32, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

/// Monetary and percentage columns are stored as decimal text; blank is zero.
fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal, RepositoryError> {
    let raw = text(row, column)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(trimmed)
        .map_err(|e| RepositoryError::Decode(format!("column `{column}` value `{raw}`: {e}")))
}

fn row_to_closed_deal(row: &SqliteRow) -> Result<ClosedDealRecord, RepositoryError> {
    Ok(ClosedDealRecord {
        deal_id: text(row, "deal_id")?,
        deal_name: text(row, "deal_name")?,
        account_name: text(row, "account_name")?,
        contract_id: optional_text(row, "contract_id")?,
        region: text(row, "region")?,
        vertical: text(row, "vertical")?,
        segment: text(row, "segment")?,
        logo_type: text(row, "logo_type")?,
        owner: text(row, "owner")?,
        sold_by: text(row, "sold_by")?,
        license_value: decimal(row, "license_value")?,
        implementation_value: decimal(row, "implementation_value")?,
        close_date: optional_text(row, "close_date")?,
        created_date: optional_text(row, "created_date")?,
    })
}

fn row_to_snapshot(row: &SqliteRow) -> Result<PipelineSnapshotRecord, RepositoryError> {
    Ok(PipelineSnapshotRecord {
        deal_id: text(row, "deal_id")?,
        deal_name: text(row, "deal_name")?,
        account_name: text(row, "account_name")?,
        contract_id: optional_text(row, "contract_id")?,
        snapshot_month: optional_text(row, "snapshot_month")?,
        stage: text(row, "stage")?,
        probability: decimal(row, "probability")?,
        deal_value: decimal(row, "deal_value")?,
        license_value: decimal(row, "license_value")?,
        implementation_value: decimal(row, "implementation_value")?,
        expected_close_date: optional_text(row, "expected_close_date")?,
        created_date: optional_text(row, "created_date")?,
        region: text(row, "region")?,
        vertical: text(row, "vertical")?,
        segment: text(row, "segment")?,
        logo_type: text(row, "logo_type")?,
        owner: text(row, "owner")?,
        sold_by: text(row, "sold_by")?,
    })
}

fn row_to_contract_mapping(row: &SqliteRow) -> Result<ContractMappingRecord, RepositoryError> {
    Ok(ContractMappingRecord {
        contract_id: text(row, "contract_id")?,
        region: optional_text(row, "region")?,
        vertical: optional_text(row, "vertical")?,
        segment: optional_text(row, "segment")?,
        revenue_type: optional_text(row, "revenue_type")?,
    })
}

fn row_to_attribution(row: &SqliteRow) -> Result<SubCategoryAttributionRecord, RepositoryError> {
    Ok(SubCategoryAttributionRecord {
        contract_id: text(row, "contract_id")?,
        year: year(row, "year")?,
        sub_category: text(row, "sub_category")?,
        percentage: decimal(row, "percentage")?,
    })
}

fn row_to_roster_member(row: &SqliteRow) -> Result<SalesRosterRecord, RepositoryError> {
    let is_manager: i64 =
        row.try_get("is_manager").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(SalesRosterRecord {
        id: text(row, "id")?,
        name: text(row, "name")?,
        region: text(row, "region")?,
        is_manager: is_manager != 0,
        manager_id: optional_text(row, "manager_id")?,
    })
}

fn row_to_historical(row: &SqliteRow) -> Result<HistoricalPerformanceRecord, RepositoryError> {
    let monthly_closed = optional_text(row, "monthly_closed_json")?
        .map(|raw| serde_json::from_str::<Vec<Decimal>>(&raw))
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(HistoricalPerformanceRecord {
        year: year(row, "year")?,
        salesperson_id: text(row, "salesperson_id")?,
        name: text(row, "name")?,
        region: text(row, "region")?,
        quota: decimal(row, "quota")?,
        closed: decimal(row, "closed")?,
        previous_year_closed: decimal(row, "previous_year_closed")?,
        pipeline: decimal(row, "pipeline")?,
        unweighted_pipeline: decimal(row, "unweighted_pipeline")?,
        forecast: decimal(row, "forecast")?,
        monthly_closed,
    })
}

#[async_trait::async_trait]
impl SourceRepository for SqlSourceRepository {
    async fn closed_deals(&self) -> Result<Vec<ClosedDealRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT deal_id, deal_name, account_name, contract_id, region, vertical, segment,
                    logo_type, owner, sold_by, license_value, implementation_value, close_date,
                    created_date
             FROM closed_deals ORDER BY deal_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_closed_deal).collect()
    }

    async fn pipeline_snapshots(&self) -> Result<Vec<PipelineSnapshotRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT deal_id, deal_name, account_name, contract_id, snapshot_month, stage,
                    probability, deal_value, license_value, implementation_value,
                    expected_close_date, created_date, region, vertical, segment, logo_type,
                    owner, sold_by
             FROM pipeline_snapshots ORDER BY snapshot_month, deal_id, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_snapshot).collect()
    }

    async fn contract_mappings(&self) -> Result<Vec<ContractMappingRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT contract_id, region, vertical, segment, revenue_type
             FROM contract_mappings ORDER BY contract_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_contract_mapping).collect()
    }

    async fn sub_category_attributions(
        &self,
    ) -> Result<Vec<SubCategoryAttributionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT contract_id, year, sub_category, percentage
             FROM sub_category_attributions ORDER BY contract_id, year, sub_category",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_attribution).collect()
    }

    async fn category_mappings(&self) -> Result<Vec<CategoryMappingRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT sub_category, category FROM category_mappings ORDER BY sub_category",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<CategoryMappingRecord, RepositoryError> {
                Ok(CategoryMappingRecord {
                    sub_category: text(row, "sub_category")?,
                    category: text(row, "category")?,
                })
            })
            .collect()
    }

    async fn sales_roster(&self) -> Result<Vec<SalesRosterRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, region, is_manager, manager_id FROM sales_roster ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_roster_member).collect()
    }

    async fn quotas(&self) -> Result<Vec<QuotaRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT salesperson_id, year, quota FROM quotas ORDER BY year, salesperson_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<QuotaRecord, RepositoryError> {
                Ok(QuotaRecord {
                    salesperson_id: text(row, "salesperson_id")?,
                    year: year(row, "year")?,
                    quota: decimal(row, "quota")?,
                })
            })
            .collect()
    }

    async fn historical_performance(
        &self,
    ) -> Result<Vec<HistoricalPerformanceRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT year, salesperson_id, name, region, quota, closed, previous_year_closed,
                    pipeline, unweighted_pipeline, forecast, monthly_closed_json
             FROM historical_performance ORDER BY year, salesperson_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_historical).collect()
    }
}
