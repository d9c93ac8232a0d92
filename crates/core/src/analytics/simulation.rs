use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analytics::filter::FilterSpec;
use crate::analytics::kpi::forecast_totals;
use crate::analytics::valuation::nominal_value;
use crate::domain::opportunity::Opportunity;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub iterations: u32,
    pub deal_count: usize,
    pub closed_baseline: Decimal,
    pub expected_forecast: Decimal,
    pub mean: Decimal,
    pub min: Decimal,
    pub p10: Decimal,
    pub p50: Decimal,
    pub p90: Decimal,
    pub max: Decimal,
}

/// Monte Carlo spread of the forecast: each open, non-expansion deal closes
/// independently with its probability and contributes its unweighted value.
pub fn simulate_forecast(
    opportunities: &[Opportunity],
    filter: &FilterSpec,
    current_year: i32,
    iterations: u32,
    seed: u64,
) -> SimulationSummary {
    let filter = filter.anchored(current_year);
    let revenue_type = filter.revenue_type();
    let totals = forecast_totals(opportunities, &filter);

    let candidates: Vec<(f64, Decimal)> = opportunities
        .iter()
        .filter(|opportunity| opportunity.counts_toward_forecast() && filter.matches(*opportunity))
        .map(|opportunity| {
            let probability = (opportunity.probability / Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or_default()
                .clamp(0.0, 1.0);
            (probability, nominal_value(opportunity, revenue_type))
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut outcomes: Vec<Decimal> = (0..iterations)
        .map(|_| {
            candidates.iter().fold(totals.closed, |total, (probability, amount)| {
                if rng.gen::<f64>() < *probability {
                    total + *amount
                } else {
                    total
                }
            })
        })
        .collect();
    outcomes.sort_unstable();

    let sum: Decimal = outcomes.iter().copied().sum();
    let mean = if outcomes.is_empty() {
        totals.closed
    } else {
        (sum / Decimal::from(outcomes.len())).round_dp(2)
    };

    SimulationSummary {
        iterations,
        deal_count: candidates.len(),
        closed_baseline: totals.closed,
        expected_forecast: totals.forecast,
        mean,
        min: outcomes.first().copied().unwrap_or(totals.closed),
        p10: percentile(&outcomes, 10).unwrap_or(totals.closed),
        p50: percentile(&outcomes, 50).unwrap_or(totals.closed),
        p90: percentile(&outcomes, 90).unwrap_or(totals.closed),
        max: outcomes.last().copied().unwrap_or(totals.closed),
    }
}

/// Nearest-rank percentile over sorted values.
fn percentile(sorted: &[Decimal], rank: usize) -> Option<Decimal> {
    if sorted.is_empty() {
        return None;
    }
    let index = (rank * sorted.len()).div_ceil(100).saturating_sub(1);
    sorted.get(index.min(sorted.len() - 1)).copied()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{percentile, simulate_forecast};
    use crate::analytics::filter::FilterSpec;
    use crate::analytics::test_support::opportunity;
    use crate::domain::opportunity::{Opportunity, OpportunityStatus};

    fn book() -> Vec<Opportunity> {
        let mut certain = opportunity("A1", OpportunityStatus::Active, 100, 0, "2026-05-01");
        certain.probability = Decimal::ONE_HUNDRED;
        let mut never = opportunity("A2", OpportunityStatus::Active, 0, 0, "2026-06-01");
        never.license_value = Decimal::from(50);
        never.probability = Decimal::ZERO;
        vec![
            opportunity("W1", OpportunityStatus::Won, 1_000, 0, "2026-02-01"),
            certain,
            never,
            opportunity("A3", OpportunityStatus::Active, 200, 0, "2026-07-01"),
        ]
    }

    #[test]
    fn outcomes_stay_between_baseline_and_full_pipeline() {
        let summary = simulate_forecast(&book(), &FilterSpec::default(), 2026, 500, 42);

        assert_eq!(summary.iterations, 500);
        assert_eq!(summary.deal_count, 3);
        assert_eq!(summary.closed_baseline, Decimal::from(1_000));
        // A1 always closes; A3 (400 unweighted) closes about half the time.
        assert_eq!(summary.min, Decimal::from(1_100));
        assert_eq!(summary.max, Decimal::from(1_500));
        assert!(summary.p10 <= summary.p50 && summary.p50 <= summary.p90);
        assert!(summary.mean > Decimal::from(1_100) && summary.mean < Decimal::from(1_500));
    }

    #[test]
    fn same_seed_reproduces_the_summary() {
        let first = simulate_forecast(&book(), &FilterSpec::default(), 2026, 200, 7);
        let second = simulate_forecast(&book(), &FilterSpec::default(), 2026, 200, 7);
        assert_eq!(first, second);
    }

    #[test]
    fn zero_iterations_fall_back_to_the_baseline() {
        let summary = simulate_forecast(&book(), &FilterSpec::default(), 2026, 0, 1);
        assert_eq!(summary.mean, Decimal::from(1_000));
        assert_eq!(summary.p90, Decimal::from(1_000));
    }

    #[test]
    fn nearest_rank_percentiles() {
        let values: Vec<Decimal> = (1..=10).map(Decimal::from).collect();
        assert_eq!(percentile(&values, 10), Some(Decimal::from(1)));
        assert_eq!(percentile(&values, 50), Some(Decimal::from(5)));
        assert_eq!(percentile(&values, 90), Some(Decimal::from(9)));
        assert_eq!(percentile(&[], 50), None);
    }
}
