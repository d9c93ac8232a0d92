use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const MONTHS_PER_YEAR: usize = 12;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SalespersonId(pub String);

impl fmt::Display for SalespersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMode {
    Historical,
    Computed,
}

/// One row of the sales-rep performance table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalespersonPerformance {
    pub id: SalespersonId,
    pub name: String,
    pub region: String,
    pub is_manager: bool,
    pub manager_id: Option<SalespersonId>,
    pub level: u32,
    pub quota: Decimal,
    pub closed_ytd: Decimal,
    pub previous_year_closed: Decimal,
    pub pipeline_value: Decimal,
    pub unweighted_pipeline: Decimal,
    pub forecast: Decimal,
    pub monthly_closed: Vec<Decimal>,
    pub monthly_attainment: Vec<Decimal>,
    pub pipeline_coverage: Decimal,
    pub forecast_attainment: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesRepPerformanceReport {
    pub year: i32,
    pub mode: PerformanceMode,
    pub rows: Vec<SalespersonPerformance>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapRow {
    pub id: SalespersonId,
    pub name: String,
    pub level: u32,
    pub monthly_attainment: Vec<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesRepHeatmap {
    pub year: i32,
    pub mode: PerformanceMode,
    pub rows: Vec<HeatmapRow>,
}
