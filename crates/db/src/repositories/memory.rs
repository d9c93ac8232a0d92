use tokio::sync::RwLock;

use salescope_core::domain::source::{
    CategoryMappingRecord, ClosedDealRecord, ContractMappingRecord, HistoricalPerformanceRecord,
    PipelineSnapshotRecord, QuotaRecord, SalesRosterRecord, SourceDataset,
    SubCategoryAttributionRecord,
};

use super::{RepositoryError, SourceRepository};

/// Source ledgers held in memory, e.g. loaded from a JSON export.
#[derive(Default)]
pub struct InMemorySourceRepository {
    dataset: RwLock<SourceDataset>,
}

impl InMemorySourceRepository {
    pub fn new(dataset: SourceDataset) -> Self {
        Self { dataset: RwLock::new(dataset) }
    }

    pub fn from_json(raw: &str) -> Result<Self, RepositoryError> {
        let dataset: SourceDataset =
            serde_json::from_str(raw).map_err(|error| RepositoryError::Decode(error.to_string()))?;
        Ok(Self::new(dataset))
    }

    #[cfg(test)]
    pub async fn replace(&self, dataset: SourceDataset) {
        let mut current = self.dataset.write().await;
        *current = dataset;
    }
}

#[async_trait::async_trait]
impl SourceRepository for InMemorySourceRepository {
    async fn closed_deals(&self) -> Result<Vec<ClosedDealRecord>, RepositoryError> {
        Ok(self.dataset.read().await.closed_deals.clone())
    }

    async fn pipeline_snapshots(&self) -> Result<Vec<PipelineSnapshotRecord>, RepositoryError> {
        Ok(self.dataset.read().await.pipeline_snapshots.clone())
    }

    async fn contract_mappings(&self) -> Result<Vec<ContractMappingRecord>, RepositoryError> {
        Ok(self.dataset.read().await.contract_mappings.clone())
    }

    async fn sub_category_attributions(
        &self,
    ) -> Result<Vec<SubCategoryAttributionRecord>, RepositoryError> {
        Ok(self.dataset.read().await.sub_category_attributions.clone())
    }

    async fn category_mappings(&self) -> Result<Vec<CategoryMappingRecord>, RepositoryError> {
        Ok(self.dataset.read().await.category_mappings.clone())
    }

    async fn sales_roster(&self) -> Result<Vec<SalesRosterRecord>, RepositoryError> {
        Ok(self.dataset.read().await.sales_roster.clone())
    }

    async fn quotas(&self) -> Result<Vec<QuotaRecord>, RepositoryError> {
        Ok(self.dataset.read().await.quotas.clone())
    }

    async fn historical_performance(
        &self,
    ) -> Result<Vec<HistoricalPerformanceRecord>, RepositoryError> {
        Ok(self.dataset.read().await.historical_performance.clone())
    }

    async fn load_dataset(&self) -> Result<SourceDataset, RepositoryError> {
        Ok(self.dataset.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use salescope_core::domain::source::{QuotaRecord, SourceDataset};

    use crate::repositories::{InMemorySourceRepository, RepositoryError, SourceRepository};

    #[tokio::test]
    async fn empty_repository_loads_empty_dataset() {
        let repository = InMemorySourceRepository::default();
        let dataset = repository.load_dataset().await.expect("load");
        assert!(dataset.is_empty());
    }

    #[tokio::test]
    async fn replace_swaps_the_whole_dataset() {
        let repository = InMemorySourceRepository::default();
        repository
            .replace(SourceDataset {
                quotas: vec![QuotaRecord {
                    salesperson_id: "r1".to_owned(),
                    year: 2026,
                    quota: Decimal::from(1_000),
                }],
                ..SourceDataset::default()
            })
            .await;

        let quotas = repository.quotas().await.expect("quotas");
        assert_eq!(quotas.len(), 1);
        assert_eq!(quotas[0].quota, Decimal::from(1_000));
    }

    #[test]
    fn json_export_round_trips_into_repository() {
        let raw = r#"{
            "closed_deals": [], "pipeline_snapshots": [], "contract_mappings": [],
            "sub_category_attributions": [], "category_mappings": [
                {"sub_category": "Core Platform", "category": "Platform"}
            ],
            "sales_roster": [], "quotas": [], "historical_performance": []
        }"#;
        assert!(InMemorySourceRepository::from_json(raw).is_ok());

        let broken = InMemorySourceRepository::from_json("{\"closed_deals\": 3}");
        assert!(matches!(broken, Err(RepositoryError::Decode(_))));
    }
}
