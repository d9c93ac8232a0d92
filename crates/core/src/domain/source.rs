//! Read-only records supplied by the source data collaborator.
//!
//! Dates and labels arrive as text exactly as the upstream ledgers store
//! them; the opportunity builder is the only place they are parsed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedDealRecord {
    pub deal_id: String,
    pub deal_name: String,
    pub account_name: String,
    pub contract_id: Option<String>,
    pub region: String,
    pub vertical: String,
    pub segment: String,
    pub logo_type: String,
    pub owner: String,
    pub sold_by: String,
    pub license_value: Decimal,
    pub implementation_value: Decimal,
    pub close_date: Option<String>,
    pub created_date: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSnapshotRecord {
    pub deal_id: String,
    pub deal_name: String,
    pub account_name: String,
    pub contract_id: Option<String>,
    pub snapshot_month: Option<String>,
    pub stage: String,
    pub probability: Decimal,
    /// Unweighted total deal size.
    pub deal_value: Decimal,
    /// Probability-weighted licence value.
    pub license_value: Decimal,
    /// Probability-weighted implementation value.
    pub implementation_value: Decimal,
    pub expected_close_date: Option<String>,
    pub created_date: Option<String>,
    pub region: String,
    pub vertical: String,
    pub segment: String,
    pub logo_type: String,
    pub owner: String,
    pub sold_by: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMappingRecord {
    pub contract_id: String,
    pub region: Option<String>,
    pub vertical: Option<String>,
    pub segment: Option<String>,
    pub revenue_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCategoryAttributionRecord {
    pub contract_id: String,
    pub year: i32,
    pub sub_category: String,
    pub percentage: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMappingRecord {
    pub sub_category: String,
    pub category: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesRosterRecord {
    pub id: String,
    pub name: String,
    pub region: String,
    pub is_manager: bool,
    pub manager_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub salesperson_id: String,
    pub year: i32,
    pub quota: Decimal,
}

/// Authoritative flat performance row for a closed-out year.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalPerformanceRecord {
    pub year: i32,
    pub salesperson_id: String,
    pub name: String,
    pub region: String,
    pub quota: Decimal,
    pub closed: Decimal,
    pub previous_year_closed: Decimal,
    pub pipeline: Decimal,
    pub unweighted_pipeline: Decimal,
    pub forecast: Decimal,
    pub monthly_closed: Option<Vec<Decimal>>,
}

/// Everything one engine invocation reads. Collections missing from a JSON
/// export deserialize as empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceDataset {
    pub closed_deals: Vec<ClosedDealRecord>,
    pub pipeline_snapshots: Vec<PipelineSnapshotRecord>,
    pub contract_mappings: Vec<ContractMappingRecord>,
    pub sub_category_attributions: Vec<SubCategoryAttributionRecord>,
    pub category_mappings: Vec<CategoryMappingRecord>,
    pub sales_roster: Vec<SalesRosterRecord>,
    pub quotas: Vec<QuotaRecord>,
    pub historical_performance: Vec<HistoricalPerformanceRecord>,
}

impl SourceDataset {
    pub fn is_empty(&self) -> bool {
        self.closed_deals.is_empty() && self.pipeline_snapshots.is_empty()
    }

    pub fn has_historical_performance(&self, year: i32) -> bool {
        self.historical_performance.iter().any(|row| row.year == year)
    }
}
