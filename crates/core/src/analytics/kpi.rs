//! Headline KPIs and the stage funnel.
//!
//! Forecast everywhere is closed value plus the weighted pipeline of open,
//! non-expansion deals, both under the filter's revenue type.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analytics::builder::SnapshotView;
use crate::analytics::filter::FilterSpec;
use crate::analytics::valuation::{
    closed_value, forecast_pipeline_value, growth, nominal_value, percentage, unweight, value,
};
use crate::domain::calendar::{parse_optional_date, ReportingMonth};
use crate::domain::opportunity::{Opportunity, OpportunityStatus, Stage};
use crate::domain::source::QuotaRecord;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastTotals {
    pub closed: Decimal,
    pub weighted_pipeline: Decimal,
    pub forecast: Decimal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub active: usize,
    pub won: usize,
    pub lost: usize,
    pub stalled: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiOverview {
    pub years: Vec<i32>,
    pub closed: Decimal,
    pub weighted_pipeline: Decimal,
    pub unweighted_pipeline: Decimal,
    pub forecast: Decimal,
    pub counts: StatusCounts,
    pub average_deal_size: Decimal,
    pub lost_value: Decimal,
    pub conversion_rate: Decimal,
    pub average_sales_cycle_days: Decimal,
    pub previous_year_closed: Decimal,
    pub previous_year_forecast: Decimal,
    pub yoy_growth: Decimal,
    pub quota: Decimal,
    pub forecast_attainment: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelStage {
    pub stage: String,
    pub count: usize,
    pub value: Decimal,
    pub weighted_value: Decimal,
}

pub fn forecast_totals(opportunities: &[Opportunity], filter: &FilterSpec) -> ForecastTotals {
    let revenue_type = filter.revenue_type();
    let mut totals = ForecastTotals::default();
    for opportunity in opportunities.iter().filter(|opportunity| filter.matches(*opportunity)) {
        totals.closed += closed_value(opportunity, revenue_type);
        totals.weighted_pipeline += forecast_pipeline_value(opportunity, revenue_type);
    }
    totals.forecast = totals.closed + totals.weighted_pipeline;
    totals
}

pub struct OverviewInputs<'a, 's> {
    pub opportunities: &'a [Opportunity],
    pub snapshots: &'a [SnapshotView<'s>],
    pub quotas: &'a [QuotaRecord],
    pub current_year: i32,
}

pub fn overview(inputs: &OverviewInputs<'_, '_>, filter: &FilterSpec) -> KpiOverview {
    let filter = filter.anchored(inputs.current_year);
    let revenue_type = filter.revenue_type();
    let totals = forecast_totals(inputs.opportunities, &filter);
    let previous_filter = filter.previous_year(inputs.current_year);
    let previous = forecast_totals(inputs.opportunities, &previous_filter);

    let mut counts = StatusCounts::default();
    let mut unweighted_pipeline = Decimal::ZERO;
    for opportunity in inputs.opportunities.iter().filter(|opportunity| filter.matches(*opportunity))
    {
        match opportunity.status {
            OpportunityStatus::Active => counts.active += 1,
            OpportunityStatus::Won => counts.won += 1,
            OpportunityStatus::Lost => counts.lost += 1,
            OpportunityStatus::Stalled => counts.stalled += 1,
        }
        if opportunity.counts_toward_forecast() {
            unweighted_pipeline += nominal_value(opportunity, revenue_type);
        }
    }

    let average_deal_size = if counts.won == 0 {
        Decimal::ZERO
    } else {
        (totals.closed / Decimal::from(counts.won)).round_dp(2)
    };
    let lost_value = reconstruct_lost_value(inputs.opportunities, inputs.snapshots, &filter);
    let quota: Decimal = inputs
        .quotas
        .iter()
        .filter(|record| filter.years.contains(&record.year))
        .map(|record| record.quota)
        .sum();

    KpiOverview {
        years: filter.years.clone(),
        closed: totals.closed,
        weighted_pipeline: totals.weighted_pipeline,
        unweighted_pipeline,
        forecast: totals.forecast,
        counts,
        average_deal_size,
        lost_value,
        conversion_rate: percentage(totals.closed, totals.closed + lost_value),
        average_sales_cycle_days: average_sales_cycle_days(
            inputs.opportunities,
            inputs.snapshots,
            &filter,
        ),
        previous_year_closed: previous.closed,
        previous_year_forecast: previous.forecast,
        yoy_growth: growth(totals.forecast, previous.forecast),
        quota,
        forecast_attainment: percentage(totals.forecast, quota),
    }
}

/// Nominal value of deals that ended lost or stalled, recovered from
/// snapshot history. Each deal contributes the un-weighted value of the last
/// month it sat in a lost or stalled stage; deals that later closed won are
/// skipped.
pub fn reconstruct_lost_value(
    opportunities: &[Opportunity],
    snapshots: &[SnapshotView<'_>],
    filter: &FilterSpec,
) -> Decimal {
    let won: HashSet<&str> = opportunities
        .iter()
        .filter(|opportunity| opportunity.status == OpportunityStatus::Won)
        .map(|opportunity| opportunity.id.0.as_str())
        .collect();

    let mut last_lost: BTreeMap<&str, &SnapshotView<'_>> = BTreeMap::new();
    for view in snapshots {
        if !(view.stage.is_lost() || view.stage == Stage::Stalled) {
            continue;
        }
        let id = view.record.deal_id.trim();
        if won.contains(id) {
            continue;
        }
        match last_lost.get(id) {
            Some(existing) if existing.month > view.month => {}
            _ => {
                last_lost.insert(id, view);
            }
        }
    }

    let revenue_type = filter.revenue_type();
    last_lost
        .values()
        .filter(|view| filter.matches(**view))
        .map(|view| unweight(value(view.record, revenue_type), view.record.probability))
        .sum()
}

#[derive(Default)]
struct DealTimeline<'v, 's> {
    created: Option<NaiveDate>,
    first_month: Option<ReportingMonth>,
    closed_month: Option<ReportingMonth>,
    latest: Option<&'v SnapshotView<'s>>,
}

impl DealTimeline<'_, '_> {
    fn created_date(&self) -> Option<NaiveDate> {
        self.created.or_else(|| self.first_month.and_then(|month| month.first_day()))
    }
}

/// Mean days from creation to close across deals matching the filter.
/// The closed-deal ledger's close date overrides the snapshot history.
pub fn average_sales_cycle_days(
    opportunities: &[Opportunity],
    snapshots: &[SnapshotView<'_>],
    filter: &FilterSpec,
) -> Decimal {
    let mut timelines: BTreeMap<&str, DealTimeline<'_, '_>> = BTreeMap::new();
    for view in snapshots {
        let timeline = timelines.entry(view.record.deal_id.trim()).or_default();
        if let Some(created) = parse_optional_date(view.record.created_date.as_deref()) {
            timeline.created = Some(timeline.created.map_or(created, |known| known.min(created)));
        }
        timeline.first_month =
            Some(timeline.first_month.map_or(view.month, |known| known.min(view.month)));
        if view.stage.is_closed() {
            timeline.closed_month =
                Some(timeline.closed_month.map_or(view.month, |known| known.max(view.month)));
        }
        if timeline.latest.map_or(true, |latest| latest.month <= view.month) {
            timeline.latest = Some(view);
        }
    }

    let mut spans: Vec<i64> = Vec::new();
    let mut won_ids: HashSet<&str> = HashSet::new();
    for opportunity in opportunities.iter().filter(|o| o.status == OpportunityStatus::Won) {
        let id = opportunity.id.0.as_str();
        won_ids.insert(id);
        if !filter.matches(opportunity) {
            continue;
        }
        let created = timelines
            .get(id)
            .and_then(DealTimeline::created_date)
            .or(opportunity.created_date);
        if let (Some(created), Some(closed)) = (created, opportunity.expected_close_date) {
            spans.push((closed - created).num_days());
        }
    }

    for (id, timeline) in &timelines {
        if won_ids.contains(id) {
            continue;
        }
        let (Some(latest), Some(closed)) =
            (timeline.latest, timeline.closed_month.and_then(|month| month.first_day()))
        else {
            continue;
        };
        if !filter.matches_dimensions(latest) || !filter.matches_period(Some(closed)) {
            continue;
        }
        if let Some(created) = timeline.created_date() {
            spans.push((closed - created).num_days());
        }
    }

    spans.retain(|days| *days >= 0);
    if spans.is_empty() {
        return Decimal::ZERO;
    }
    let total: i64 = spans.iter().sum();
    (Decimal::from(total) / Decimal::from(spans.len())).round_dp(1)
}

/// Open stages in canonical order, then Closed Won and Closed Lost.
pub fn funnel(opportunities: &[Opportunity], filter: &FilterSpec) -> Vec<FunnelStage> {
    let revenue_type = filter.revenue_type();
    let matching: Vec<&Opportunity> =
        opportunities.iter().filter(|opportunity| filter.matches(*opportunity)).collect();

    let mut stages: Vec<FunnelStage> = Stage::OPEN_FUNNEL
        .iter()
        .map(|stage| {
            let mut row = empty_stage(stage.label());
            for opportunity in matching
                .iter()
                .filter(|opportunity| opportunity.status.is_open() && opportunity.stage == *stage)
            {
                row.count += 1;
                row.value += nominal_value(opportunity, revenue_type);
                row.weighted_value += value(*opportunity, revenue_type);
            }
            row
        })
        .collect();

    let mut won = empty_stage(Stage::ClosedWon.label());
    let mut lost = empty_stage(Stage::ClosedLost.label());
    for opportunity in &matching {
        match opportunity.status {
            OpportunityStatus::Won => {
                let closed = closed_value(opportunity, revenue_type);
                won.count += 1;
                won.value += closed;
                won.weighted_value += closed;
            }
            OpportunityStatus::Lost => {
                lost.count += 1;
                lost.value += nominal_value(opportunity, revenue_type);
                lost.weighted_value += value(*opportunity, revenue_type);
            }
            OpportunityStatus::Active | OpportunityStatus::Stalled => {}
        }
    }
    stages.push(won);
    stages.push(lost);
    stages
}

fn empty_stage(label: &str) -> FunnelStage {
    FunnelStage {
        stage: label.to_owned(),
        count: 0,
        value: Decimal::ZERO,
        weighted_value: Decimal::ZERO,
    }
}
