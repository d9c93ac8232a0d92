//! Aggregation engine over a borrowed [`SourceDataset`].
//!
//! [`AnalyticsEngine`] builds the opportunity set and the resolved snapshot
//! history once, then answers every report from those immutable views.
//! Nothing is cached across engines; building a new engine from the same
//! dataset gives byte-identical reports.

pub mod builder;
pub mod deals;
pub mod filter;
pub mod forecast;
pub mod kpi;
pub mod movement;
pub mod rollup;
pub mod simulation;
pub mod valuation;

#[cfg(test)]
pub(crate) mod test_support;

use crate::config::{AnalyticsConfig, AppConfig};
use crate::domain::opportunity::{Opportunity, OpportunityId};
use crate::domain::salesperson::{
    SalesRepHeatmap, SalesRepPerformanceReport, SalespersonId, SalespersonPerformance,
};
use crate::domain::source::SourceDataset;
use crate::errors::DomainError;

use self::builder::{OpportunityBuilder, SnapshotView};
use self::deals::{DealQuery, Page};
use self::filter::FilterSpec;
use self::forecast::{SubCategoryForecastRow, SubCategoryPipelineRow, TrendRow};
use self::kpi::{FunnelStage, KpiOverview, OverviewInputs};
use self::movement::PipelineMovement;
use self::simulation::SimulationSummary;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnalyticsSettings {
    pub current_year: i32,
    pub movement_lookback_months: u32,
    pub simulation_iterations: u32,
    pub simulation_seed: u64,
    pub default_page_size: usize,
}

impl AnalyticsSettings {
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self {
            current_year: config.resolved_operating_year(),
            movement_lookback_months: config.movement_lookback_months,
            simulation_iterations: config.simulation_iterations,
            simulation_seed: config.simulation_seed,
            default_page_size: config.default_page_size,
        }
    }

    pub fn for_year(current_year: i32) -> Self {
        Self { current_year, ..Self::from_config(&AppConfig::default().analytics) }
    }
}

pub struct AnalyticsEngine<'a> {
    dataset: &'a SourceDataset,
    opportunities: Vec<Opportunity>,
    snapshots: Vec<SnapshotView<'a>>,
    settings: AnalyticsSettings,
}

impl<'a> AnalyticsEngine<'a> {
    pub fn new(dataset: &'a SourceDataset, settings: AnalyticsSettings) -> Self {
        let builder = OpportunityBuilder::new(dataset);
        let opportunities = builder.build();
        let snapshots = builder.snapshot_views();
        Self { dataset, opportunities, snapshots, settings }
    }

    pub fn settings(&self) -> &AnalyticsSettings {
        &self.settings
    }

    pub fn opportunities(&self) -> &[Opportunity] {
        &self.opportunities
    }

    pub fn overview(&self, filter: &FilterSpec) -> Result<KpiOverview, DomainError> {
        filter.validate()?;
        let inputs = OverviewInputs {
            opportunities: &self.opportunities,
            snapshots: &self.snapshots,
            quotas: &self.dataset.quotas,
            current_year: self.settings.current_year,
        };
        Ok(kpi::overview(&inputs, filter))
    }

    pub fn funnel(&self, filter: &FilterSpec) -> Result<Vec<FunnelStage>, DomainError> {
        filter.validate()?;
        Ok(kpi::funnel(&self.opportunities, filter))
    }

    pub fn key_deals(
        &self,
        filter: &FilterSpec,
        query: &DealQuery,
    ) -> Result<Page<Opportunity>, DomainError> {
        filter.validate()?;
        let page_size = self.settings.default_page_size;
        Ok(deals::key_deals(&self.opportunities, filter, query, page_size))
    }

    pub fn closed_deals(
        &self,
        filter: &FilterSpec,
        query: &DealQuery,
    ) -> Result<Page<Opportunity>, DomainError> {
        filter.validate()?;
        let page_size = self.settings.default_page_size;
        Ok(deals::closed_deals(&self.opportunities, filter, query, page_size))
    }

    pub fn deal(&self, id: &OpportunityId) -> Result<Opportunity, DomainError> {
        deals::find_deal(&self.opportunities, id).cloned()
    }

    pub fn quarterly_forecast(&self, filter: &FilterSpec) -> Result<Vec<TrendRow>, DomainError> {
        filter.validate()?;
        Ok(forecast::quarterly_forecast(&self.opportunities, filter, self.settings.current_year))
    }

    pub fn regional_forecast(&self, filter: &FilterSpec) -> Result<Vec<TrendRow>, DomainError> {
        filter.validate()?;
        Ok(forecast::regional_forecast(&self.opportunities, filter, self.settings.current_year))
    }

    pub fn monthly_forecast(&self, filter: &FilterSpec) -> Result<Vec<TrendRow>, DomainError> {
        filter.validate()?;
        Ok(forecast::monthly_forecast(&self.opportunities, filter, self.settings.current_year))
    }

    pub fn sub_category_forecast(
        &self,
        filter: &FilterSpec,
    ) -> Result<Vec<SubCategoryForecastRow>, DomainError> {
        filter.validate()?;
        Ok(forecast::sub_category_forecast(
            &self.opportunities,
            filter,
            self.settings.current_year,
        ))
    }

    pub fn pipeline_by_sub_category(
        &self,
        filter: &FilterSpec,
    ) -> Result<Vec<SubCategoryPipelineRow>, DomainError> {
        filter.validate()?;
        Ok(forecast::pipeline_by_sub_category(&self.opportunities, filter))
    }

    /// `lookback_months` defaults to the configured distance.
    pub fn pipeline_movement(
        &self,
        filter: &FilterSpec,
        lookback_months: Option<u32>,
    ) -> Result<PipelineMovement, DomainError> {
        filter.validate()?;
        let lookback = lookback_months.unwrap_or(self.settings.movement_lookback_months);
        movement::pipeline_movement(&self.snapshots, filter, lookback)
    }

    /// Year resolution: explicit year, else the latest selected year, else
    /// the operating year.
    pub fn sales_rep_performance(
        &self,
        filter: &FilterSpec,
        year: Option<i32>,
    ) -> Result<SalesRepPerformanceReport, DomainError> {
        filter.validate()?;
        let year = year
            .or_else(|| filter.years.iter().max().copied())
            .unwrap_or(self.settings.current_year);
        Ok(rollup::sales_rep_performance(self.dataset, &self.opportunities, filter, year))
    }

    pub fn sales_rep_heatmap(
        &self,
        filter: &FilterSpec,
        year: Option<i32>,
    ) -> Result<SalesRepHeatmap, DomainError> {
        let report = self.sales_rep_performance(filter, year)?;
        Ok(rollup::heatmap(&report))
    }

    pub fn sales_rep(
        &self,
        filter: &FilterSpec,
        year: Option<i32>,
        id: &SalespersonId,
    ) -> Result<SalespersonPerformance, DomainError> {
        let report = self.sales_rep_performance(filter, year)?;
        rollup::find_sales_rep(&report, id)
    }

    pub fn forecast_simulation(
        &self,
        filter: &FilterSpec,
    ) -> Result<SimulationSummary, DomainError> {
        filter.validate()?;
        Ok(simulation::simulate_forecast(
            &self.opportunities,
            filter,
            self.settings.current_year,
            self.settings.simulation_iterations,
            self.settings.simulation_seed,
        ))
    }
}
