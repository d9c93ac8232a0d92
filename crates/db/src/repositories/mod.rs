use async_trait::async_trait;
use sqlx::migrate::MigrateError;
use thiserror::Error;

use salescope_core::domain::source::{
    CategoryMappingRecord, ClosedDealRecord, ContractMappingRecord, HistoricalPerformanceRecord,
    PipelineSnapshotRecord, QuotaRecord, SalesRosterRecord, SourceDataset,
    SubCategoryAttributionRecord,
};

pub mod memory;
pub mod sql;

pub use memory::InMemorySourceRepository;
pub use sql::SqlSourceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("migration error: {0}")]
    Migration(#[from] MigrateError),
}

/// Read-only access to the source ledgers one engine invocation consumes.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn closed_deals(&self) -> Result<Vec<ClosedDealRecord>, RepositoryError>;
    async fn pipeline_snapshots(&self) -> Result<Vec<PipelineSnapshotRecord>, RepositoryError>;
    async fn contract_mappings(&self) -> Result<Vec<ContractMappingRecord>, RepositoryError>;
    async fn sub_category_attributions(
        &self,
    ) -> Result<Vec<SubCategoryAttributionRecord>, RepositoryError>;
    async fn category_mappings(&self) -> Result<Vec<CategoryMappingRecord>, RepositoryError>;
    async fn sales_roster(&self) -> Result<Vec<SalesRosterRecord>, RepositoryError>;
    async fn quotas(&self) -> Result<Vec<QuotaRecord>, RepositoryError>;
    async fn historical_performance(
        &self,
    ) -> Result<Vec<HistoricalPerformanceRecord>, RepositoryError>;

    /// Snapshot of every collection, read once per invocation.
    async fn load_dataset(&self) -> Result<SourceDataset, RepositoryError> {
        let dataset = SourceDataset {
            closed_deals: self.closed_deals().await?,
            pipeline_snapshots: self.pipeline_snapshots().await?,
            contract_mappings: self.contract_mappings().await?,
            sub_category_attributions: self.sub_category_attributions().await?,
            category_mappings: self.category_mappings().await?,
            sales_roster: self.sales_roster().await?,
            quotas: self.quotas().await?,
            historical_performance: self.historical_performance().await?,
        };

        tracing::info!(
            event_name = "db.source.loaded",
            closed_deals = dataset.closed_deals.len(),
            pipeline_snapshots = dataset.pipeline_snapshots.len(),
            roster = dataset.sales_roster.len(),
            historical_rows = dataset.historical_performance.len(),
            "source dataset loaded"
        );
        Ok(dataset)
    }
}
