//! Report commands: load the ledgers once, build an engine, answer one query.

use std::fs;
use std::path::Path;

use salescope_core::analytics::forecast::{
    SubCategoryForecastRow, SubCategoryPipelineRow, TrendRow,
};
use salescope_core::config::AppConfig;
use salescope_core::domain::salesperson::{SalesRepHeatmap, SalesRepPerformanceReport};
use salescope_core::domain::source::SourceDataset;
use salescope_core::{
    AnalyticsEngine, AnalyticsSettings, ApplicationError, DealQuery, DealSortField, DomainError,
    OpportunityId, SalespersonId, SalespersonPerformance, SortDirection,
};
use salescope_db::{InMemorySourceRepository, RepositoryError, SourceRepository, SqlSourceRepository};
use serde::Serialize;

use crate::commands::{open_migrated_pool, CommandOptions, CommandResult};
use crate::{FilterArgs, ForecastBy};

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ForecastReport {
    Trend(Vec<TrendRow>),
    SubCategory(Vec<SubCategoryForecastRow>),
    SubCategoryPipeline(Vec<SubCategoryPipelineRow>),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RollupReport {
    Performance(SalesRepPerformanceReport),
    Heatmap(SalesRepHeatmap),
    SalesRep(Box<SalespersonPerformance>),
}

#[derive(Clone, Debug, Default)]
pub struct DealsRequest {
    pub closed: bool,
    pub sort: String,
    pub asc: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct RollupRequest {
    pub year: Option<i32>,
    pub heatmap: bool,
    pub rep: Option<String>,
}

pub fn overview(options: &CommandOptions, filters: &FilterArgs) -> CommandResult {
    execute("overview", options, |engine| engine.overview(&filters.to_filter()?))
}

pub fn funnel(options: &CommandOptions, filters: &FilterArgs) -> CommandResult {
    execute("funnel", options, |engine| engine.funnel(&filters.to_filter()?))
}

pub fn forecast(options: &CommandOptions, by: ForecastBy, filters: &FilterArgs) -> CommandResult {
    execute("forecast", options, |engine| {
        let filter = filters.to_filter()?;
        Ok(match by {
            ForecastBy::Quarter => ForecastReport::Trend(engine.quarterly_forecast(&filter)?),
            ForecastBy::Region => ForecastReport::Trend(engine.regional_forecast(&filter)?),
            ForecastBy::Month => ForecastReport::Trend(engine.monthly_forecast(&filter)?),
            ForecastBy::SubCategory => {
                ForecastReport::SubCategory(engine.sub_category_forecast(&filter)?)
            }
            ForecastBy::SubCategoryPipeline => {
                ForecastReport::SubCategoryPipeline(engine.pipeline_by_sub_category(&filter)?)
            }
        })
    })
}

pub fn deals(
    options: &CommandOptions,
    request: &DealsRequest,
    filters: &FilterArgs,
) -> CommandResult {
    execute("deals", options, |engine| {
        let filter = filters.to_filter()?;
        let query = DealQuery {
            sort: request.sort.parse::<DealSortField>()?,
            direction: if request.asc { SortDirection::Asc } else { SortDirection::Desc },
            offset: request.offset,
            limit: request.limit,
        };
        if request.closed {
            engine.closed_deals(&filter, &query)
        } else {
            engine.key_deals(&filter, &query)
        }
    })
}

pub fn deal(options: &CommandOptions, id: &str) -> CommandResult {
    execute("deal", options, |engine| engine.deal(&OpportunityId(id.to_owned())))
}

pub fn movement(
    options: &CommandOptions,
    lookback: Option<u32>,
    filters: &FilterArgs,
) -> CommandResult {
    execute("movement", options, |engine| {
        engine.pipeline_movement(&filters.to_filter()?, lookback)
    })
}

pub fn rollup(
    options: &CommandOptions,
    request: &RollupRequest,
    filters: &FilterArgs,
) -> CommandResult {
    execute("rollup", options, |engine| {
        let filter = filters.to_filter()?;
        if let Some(rep) = &request.rep {
            let row = engine.sales_rep(&filter, request.year, &SalespersonId(rep.clone()))?;
            return Ok(RollupReport::SalesRep(Box::new(row)));
        }
        if request.heatmap {
            return Ok(RollupReport::Heatmap(engine.sales_rep_heatmap(&filter, request.year)?));
        }
        Ok(RollupReport::Performance(engine.sales_rep_performance(&filter, request.year)?))
    })
}

pub fn simulate(options: &CommandOptions, filters: &FilterArgs) -> CommandResult {
    execute("simulate", options, |engine| engine.forecast_simulation(&filters.to_filter()?))
}

/// Loads configuration and ledgers, runs `report` against a fresh engine and
/// wraps the outcome in the standard command payload.
fn execute<T, F>(command: &'static str, options: &CommandOptions, report: F) -> CommandResult
where
    T: Serialize,
    F: FnOnce(&AnalyticsEngine<'_>) -> Result<T, DomainError>,
{
    let (config, runtime) = match options.prepare(command) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let dataset = match runtime.block_on(load_dataset(&config, options.dataset_path.as_deref())) {
        Ok(dataset) => dataset,
        Err(error) => return CommandResult::from_application_error(command, error),
    };

    let settings = AnalyticsSettings::from_config(&config.analytics);
    tracing::info!(
        event_name = "cli.report.started",
        command,
        operating_year = settings.current_year,
        "running report"
    );

    let engine = AnalyticsEngine::new(&dataset, settings);
    match report(&engine) {
        Ok(result) => CommandResult::report(command, &result),
        Err(error) => CommandResult::from_application_error(command, error.into()),
    }
}

async fn load_dataset(
    config: &AppConfig,
    dataset_path: Option<&Path>,
) -> Result<SourceDataset, ApplicationError> {
    if let Some(path) = dataset_path {
        let raw = fs::read_to_string(path).map_err(|error| {
            ApplicationError::Persistence(format!("could not read `{}`: {error}", path.display()))
        })?;
        let repository = InMemorySourceRepository::from_json(&raw).map_err(source_failure)?;
        return repository.load_dataset().await.map_err(source_failure);
    }

    let pool = open_migrated_pool(&config.database)
        .await
        .map_err(|(_, message, _)| ApplicationError::Persistence(message))?;

    let dataset = SqlSourceRepository::new(pool.clone()).load_dataset().await;
    pool.close().await;
    dataset.map_err(source_failure)
}

fn source_failure(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
