use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analytics::filter::FilterSpec;
use crate::analytics::kpi::forecast_totals;
use crate::analytics::valuation::{
    closed_value, forecast_pipeline_value, growth, nominal_value, value,
};
use crate::domain::calendar::{quarter_of, ReportingMonth};
use crate::domain::opportunity::{Opportunity, SubCategoryShare};

pub const UNASSIGNED_SUB_CATEGORY: &str = "Unassigned";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendRow {
    pub bucket: String,
    pub closed: Decimal,
    pub weighted_pipeline: Decimal,
    pub forecast: Decimal,
    pub prior_year_forecast: Decimal,
    pub variance: Decimal,
    pub yoy_growth: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCategoryForecastRow {
    pub sub_category: String,
    pub category: Option<String>,
    pub closed: Decimal,
    pub pipeline: Decimal,
    pub forecast: Decimal,
    pub prior_year_closed: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCategoryPipelineRow {
    pub sub_category: String,
    pub category: Option<String>,
    pub weighted_pipeline: Decimal,
    pub unweighted_pipeline: Decimal,
    pub deal_count: usize,
}

/// One row per selected year and quarter.
pub fn quarterly_forecast(
    opportunities: &[Opportunity],
    filter: &FilterSpec,
    current_year: i32,
) -> Vec<TrendRow> {
    let filter = filter.anchored(current_year);
    let quarters = selected_or(&filter.quarters, 1..=4);

    let mut rows = Vec::new();
    for year in &filter.years {
        for quarter in &quarters {
            let bucket_filter = filter.with_years(vec![*year]).with_quarters(vec![*quarter]);
            rows.push(trend_row(
                format!("{year}-Q{quarter}"),
                opportunities,
                &bucket_filter,
                current_year,
            ));
        }
    }
    rows
}

/// One row per selected year and month. Quarter selections narrow the
/// months listed.
pub fn monthly_forecast(
    opportunities: &[Opportunity],
    filter: &FilterSpec,
    current_year: i32,
) -> Vec<TrendRow> {
    let filter = filter.anchored(current_year);
    let months: Vec<u32> = selected_or(&filter.months, 1..=12)
        .into_iter()
        .filter(|month| {
            filter.quarters.is_empty() || filter.quarters.contains(&quarter_of(*month))
        })
        .collect();

    let mut rows = Vec::new();
    for year in &filter.years {
        for month in &months {
            let Some(bucket) = ReportingMonth::new(*year, *month) else {
                continue;
            };
            let bucket_filter = filter.with_years(vec![*year]).with_months(vec![*month]);
            rows.push(trend_row(bucket.to_string(), opportunities, &bucket_filter, current_year));
        }
    }
    rows
}

/// One row per region present among matching deals, alphabetical.
pub fn regional_forecast(
    opportunities: &[Opportunity],
    filter: &FilterSpec,
    current_year: i32,
) -> Vec<TrendRow> {
    let filter = filter.anchored(current_year);
    let previous = filter.previous_year(current_year);

    // Regions seen in either period so a region that shrank to zero still shows.
    let regions: BTreeSet<String> = opportunities
        .iter()
        .filter(|opportunity| filter.matches(*opportunity) || previous.matches(*opportunity))
        .map(|opportunity| opportunity.region.trim().to_owned())
        .filter(|region| !region.is_empty())
        .collect();

    regions
        .into_iter()
        .map(|region| {
            let bucket_filter = filter.with_regions(vec![region.clone()]);
            trend_row(region, opportunities, &bucket_filter, current_year)
        })
        .collect()
}

fn trend_row(
    bucket: String,
    opportunities: &[Opportunity],
    filter: &FilterSpec,
    current_year: i32,
) -> TrendRow {
    let current = forecast_totals(opportunities, filter);
    let prior = forecast_totals(opportunities, &filter.previous_year(current_year));

    TrendRow {
        bucket,
        closed: current.closed,
        weighted_pipeline: current.weighted_pipeline,
        forecast: current.forecast,
        prior_year_forecast: prior.forecast,
        variance: current.forecast - prior.forecast,
        yoy_growth: growth(current.forecast, prior.forecast),
    }
}

fn selected_or(selected: &[u32], all: std::ops::RangeInclusive<u32>) -> Vec<u32> {
    if selected.is_empty() {
        all.collect()
    } else {
        let mut values = selected.to_vec();
        values.sort_unstable();
        values.dedup();
        values
    }
}

type SubCategoryKey = (String, Option<String>);

/// Splits `amount` across the deal's sub-category breakdown. Deals without
/// an attribution land in the unassigned bucket.
fn allocate(opportunity: &Opportunity, amount: Decimal) -> Vec<(SubCategoryKey, Decimal)> {
    if opportunity.sub_category_breakdown.is_empty() {
        return vec![((UNASSIGNED_SUB_CATEGORY.to_owned(), None), amount)];
    }
    opportunity
        .sub_category_breakdown
        .iter()
        .map(|share: &SubCategoryShare| {
            (
                (share.sub_category.clone(), share.category.clone()),
                amount * share.percentage / Decimal::ONE_HUNDRED,
            )
        })
        .collect()
}

/// Closed, pipeline and forecast per sub-category, largest forecast first.
pub fn sub_category_forecast(
    opportunities: &[Opportunity],
    filter: &FilterSpec,
    current_year: i32,
) -> Vec<SubCategoryForecastRow> {
    let filter = filter.anchored(current_year);
    let previous = filter.previous_year(current_year);
    let revenue_type = filter.revenue_type();

    let mut buckets: BTreeMap<SubCategoryKey, SubCategoryForecastRow> = BTreeMap::new();

    for opportunity in opportunities {
        if filter.matches(opportunity) {
            let closed = closed_value(opportunity, revenue_type);
            let pipeline = forecast_pipeline_value(opportunity, revenue_type);
            if !closed.is_zero() || !pipeline.is_zero() {
                for (key, closed_share) in allocate(opportunity, closed) {
                    forecast_bucket(&mut buckets, key).closed += closed_share;
                }
                for (key, pipeline_share) in allocate(opportunity, pipeline) {
                    forecast_bucket(&mut buckets, key).pipeline += pipeline_share;
                }
            }
        }
        if previous.matches(opportunity) {
            let prior = closed_value(opportunity, revenue_type);
            if !prior.is_zero() {
                for (key, prior_share) in allocate(opportunity, prior) {
                    forecast_bucket(&mut buckets, key).prior_year_closed += prior_share;
                }
            }
        }
    }

    let mut rows: Vec<SubCategoryForecastRow> = buckets
        .into_values()
        .map(|mut row| {
            row.closed = row.closed.round_dp(2);
            row.pipeline = row.pipeline.round_dp(2);
            row.forecast = row.closed + row.pipeline;
            row.prior_year_closed = row.prior_year_closed.round_dp(2);
            row
        })
        .collect();
    rows.sort_by(|left, right| {
        right.forecast.cmp(&left.forecast).then_with(|| left.sub_category.cmp(&right.sub_category))
    });
    rows
}

fn forecast_bucket(
    buckets: &mut BTreeMap<SubCategoryKey, SubCategoryForecastRow>,
    key: SubCategoryKey,
) -> &mut SubCategoryForecastRow {
    buckets.entry(key.clone()).or_insert_with(|| SubCategoryForecastRow {
        sub_category: key.0,
        category: key.1,
        closed: Decimal::ZERO,
        pipeline: Decimal::ZERO,
        forecast: Decimal::ZERO,
        prior_year_closed: Decimal::ZERO,
    })
}

/// Open pipeline per sub-category, largest weighted value first.
pub fn pipeline_by_sub_category(
    opportunities: &[Opportunity],
    filter: &FilterSpec,
) -> Vec<SubCategoryPipelineRow> {
    let revenue_type = filter.revenue_type();
    let mut buckets: BTreeMap<SubCategoryKey, SubCategoryPipelineRow> = BTreeMap::new();

    for opportunity in opportunities
        .iter()
        .filter(|opportunity| opportunity.status.is_open() && filter.matches(*opportunity))
    {
        let weighted = allocate(opportunity, value(opportunity, revenue_type));
        let unweighted = allocate(opportunity, nominal_value(opportunity, revenue_type));
        for ((key, weighted_share), (_, unweighted_share)) in weighted.into_iter().zip(unweighted) {
            let row = buckets.entry(key.clone()).or_insert_with(|| SubCategoryPipelineRow {
                sub_category: key.0,
                category: key.1,
                weighted_pipeline: Decimal::ZERO,
                unweighted_pipeline: Decimal::ZERO,
                deal_count: 0,
            });
            row.weighted_pipeline += weighted_share;
            row.unweighted_pipeline += unweighted_share;
            row.deal_count += 1;
        }
    }

    let mut rows: Vec<SubCategoryPipelineRow> = buckets
        .into_values()
        .map(|mut row| {
            row.weighted_pipeline = row.weighted_pipeline.round_dp(2);
            row.unweighted_pipeline = row.unweighted_pipeline.round_dp(2);
            row
        })
        .collect();
    rows.sort_by(|left, right| {
        right
            .weighted_pipeline
            .cmp(&left.weighted_pipeline)
            .then_with(|| left.sub_category.cmp(&right.sub_category))
    });
    rows
}
