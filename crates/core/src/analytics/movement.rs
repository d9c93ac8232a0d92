//! Month-over-month pipeline movement.
//!
//! Two snapshot months are indexed by deal id and every deal lands in at
//! most one bucket. Starting and ending pipeline are summed independently,
//! so the waterfall reconciles:
//!
//! ```text
//! starting + new + increased - decreased - won - lost == ending
//! ```

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analytics::builder::SnapshotView;
use crate::analytics::filter::FilterSpec;
use crate::analytics::valuation::value;
use crate::domain::calendar::ReportingMonth;
use crate::domain::opportunity::WON_STAGE_MARKER;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementBucket {
    New,
    Increased,
    Decreased,
    Won,
    Lost,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub count: usize,
    pub value: Decimal,
}

impl BucketSummary {
    fn add(&mut self, amount: Decimal) {
        self.count += 1;
        self.value += amount;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealMovement {
    pub deal_id: String,
    pub deal_name: String,
    pub account_name: String,
    pub category: MovementBucket,
    pub previous_value: Decimal,
    pub current_value: Decimal,
    pub delta: Decimal,
    pub stage: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterfallStep {
    pub label: String,
    /// Signed contribution; starting and ending steps carry totals.
    pub value: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMovement {
    pub target_month: Option<ReportingMonth>,
    pub comparison_month: Option<ReportingMonth>,
    pub lookback_months: u32,
    pub starting_pipeline: Decimal,
    pub ending_pipeline: Decimal,
    pub new: BucketSummary,
    pub increased: BucketSummary,
    pub decreased: BucketSummary,
    pub won: BucketSummary,
    pub lost: BucketSummary,
    pub movements: Vec<DealMovement>,
    pub waterfall: Vec<WaterfallStep>,
}

impl PipelineMovement {
    fn empty(lookback_months: u32) -> Self {
        let mut movement = Self {
            target_month: None,
            comparison_month: None,
            lookback_months,
            starting_pipeline: Decimal::ZERO,
            ending_pipeline: Decimal::ZERO,
            new: BucketSummary::default(),
            increased: BucketSummary::default(),
            decreased: BucketSummary::default(),
            won: BucketSummary::default(),
            lost: BucketSummary::default(),
            movements: Vec::new(),
            waterfall: Vec::new(),
        };
        movement.waterfall = movement.build_waterfall();
        movement
    }

    fn build_waterfall(&self) -> Vec<WaterfallStep> {
        let step = |label: &str, value: Decimal| WaterfallStep { label: label.to_owned(), value };
        vec![
            step("Starting Pipeline", self.starting_pipeline),
            step("New", self.new.value),
            step("Increased", self.increased.value),
            step("Decreased", -self.decreased.value),
            step("Won", -self.won.value),
            step("Lost", -self.lost.value),
            step("Ending Pipeline", self.ending_pipeline),
        ]
    }
}

/// Per-deal state within one month. Duplicate rows are summed; the last
/// row seen supplies the descriptive fields.
struct MonthEntry<'s> {
    value: Decimal,
    name: &'s str,
    account: &'s str,
    stage: &'s str,
}

/// Picks the target month: the latest snapshot month, or the latest one
/// satisfying the filter's year/quarter/month selections.
pub fn resolve_target_month(
    months: &BTreeSet<ReportingMonth>,
    filter: &FilterSpec,
) -> Option<ReportingMonth> {
    months
        .iter()
        .rev()
        .find(|month| {
            (filter.years.is_empty() || filter.years.contains(&month.year))
                && (filter.quarters.is_empty() || filter.quarters.contains(&month.quarter()))
                && (filter.months.is_empty() || filter.months.contains(&month.month))
        })
        .copied()
}

pub fn pipeline_movement(
    snapshots: &[SnapshotView<'_>],
    filter: &FilterSpec,
    lookback_months: u32,
) -> Result<PipelineMovement, DomainError> {
    if lookback_months == 0 {
        return Err(DomainError::InvalidFilter("lookback must be at least one month".to_owned()));
    }

    let months: BTreeSet<ReportingMonth> = snapshots.iter().map(|view| view.month).collect();
    if months.len() < 2 {
        tracing::debug!(
            event_name = "analytics.movement.unresolved",
            months = months.len(),
            "fewer than two snapshot months"
        );
        return Ok(PipelineMovement::empty(lookback_months));
    }

    let Some(target) = resolve_target_month(&months, filter) else {
        tracing::debug!(
            event_name = "analytics.movement.unresolved",
            reason = "no_target_month",
            "no snapshot month satisfies the period filter"
        );
        return Ok(PipelineMovement::empty(lookback_months));
    };
    let Some(comparison) = target.months_before(lookback_months) else {
        tracing::debug!(
            event_name = "analytics.movement.unresolved",
            target = %target,
            lookback_months,
            "comparison month is out of range"
        );
        return Ok(PipelineMovement::empty(lookback_months));
    };
    if !months.contains(&comparison) {
        tracing::debug!(
            event_name = "analytics.movement.unresolved",
            target = %target,
            comparison = %comparison,
            "comparison month has no snapshot"
        );
        return Ok(PipelineMovement::empty(lookback_months));
    }

    let revenue_type = filter.revenue_type();
    let mut current: BTreeMap<&str, MonthEntry<'_>> = BTreeMap::new();
    let mut previous: BTreeMap<&str, MonthEntry<'_>> = BTreeMap::new();
    for view in snapshots {
        let index = if view.month == target {
            &mut current
        } else if view.month == comparison {
            &mut previous
        } else {
            continue;
        };
        if !filter.matches_dimensions(view) {
            continue;
        }

        let amount = value(view.record, revenue_type);
        let entry = index.entry(view.record.deal_id.trim()).or_insert(MonthEntry {
            value: Decimal::ZERO,
            name: &view.record.deal_name,
            account: &view.record.account_name,
            stage: &view.record.stage,
        });
        entry.value += amount;
        entry.name = &view.record.deal_name;
        entry.account = &view.record.account_name;
        entry.stage = &view.record.stage;
    }

    let mut result = PipelineMovement::empty(lookback_months);
    result.target_month = Some(target);
    result.comparison_month = Some(comparison);
    result.starting_pipeline = previous.values().map(|entry| entry.value).sum();
    result.ending_pipeline = current.values().map(|entry| entry.value).sum();

    let ids: BTreeSet<&str> = current.keys().chain(previous.keys()).copied().collect();
    for id in ids {
        let (category, entry, previous_value, current_value) =
            match (previous.get(id), current.get(id)) {
                (None, Some(now)) => (MovementBucket::New, now, Decimal::ZERO, now.value),
                (Some(before), Some(now)) if now.value > before.value => {
                    (MovementBucket::Increased, now, before.value, now.value)
                }
                (Some(before), Some(now)) if now.value < before.value => {
                    (MovementBucket::Decreased, now, before.value, now.value)
                }
                (Some(_), Some(_)) => continue,
                (Some(before), None) => {
                    let category = if before.stage.trim_start().starts_with(WON_STAGE_MARKER) {
                        MovementBucket::Won
                    } else {
                        MovementBucket::Lost
                    };
                    (category, before, before.value, Decimal::ZERO)
                }
                (None, None) => continue,
            };

        let delta = current_value - previous_value;
        match category {
            MovementBucket::New => result.new.add(current_value),
            MovementBucket::Increased => result.increased.add(delta),
            MovementBucket::Decreased => result.decreased.add(-delta),
            MovementBucket::Won => result.won.add(previous_value),
            MovementBucket::Lost => result.lost.add(previous_value),
        }
        result.movements.push(DealMovement {
            deal_id: id.to_owned(),
            deal_name: entry.name.to_owned(),
            account_name: entry.account.to_owned(),
            category,
            previous_value,
            current_value,
            delta,
            stage: entry.stage.trim().to_owned(),
        });
    }

    result.movements.sort_by(|left, right| {
        left.category.cmp(&right.category).then_with(|| left.deal_id.cmp(&right.deal_id))
    });
    result.waterfall = result.build_waterfall();
    Ok(result)
}
