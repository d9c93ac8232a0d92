//! Sales-rep performance with manager rollups.
//!
//! A year either has authoritative flat performance rows (historical mode)
//! or is computed from the roster, quotas and the opportunity set (computed
//! mode). One availability check per requested year picks the
//! [`PerformanceSource`].
//!
//! In computed mode a manager's figures are their own totals plus the
//! rollup of every direct report. The org chart is an adjacency list built
//! per call and walked recursively with an in-progress set, so a reporting
//! cycle terminates instead of recursing forever.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Datelike;
use rust_decimal::Decimal;

use crate::analytics::filter::FilterSpec;
use crate::analytics::valuation::{
    closed_value, forecast_pipeline_value, nominal_value, percentage, ratio,
};
use crate::domain::opportunity::{Opportunity, OpportunityStatus};
use crate::domain::salesperson::{
    HeatmapRow, PerformanceMode, SalesRepHeatmap, SalesRepPerformanceReport,
    SalespersonPerformance, SalespersonId, MONTHS_PER_YEAR,
};
use crate::domain::source::{
    HistoricalPerformanceRecord, QuotaRecord, SalesRosterRecord, SourceDataset,
};
use crate::errors::DomainError;

pub trait PerformanceSource {
    fn mode(&self) -> PerformanceMode;
    fn rows(&self, year: i32) -> Vec<SalespersonPerformance>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Totals {
    quota: Decimal,
    closed: Decimal,
    previous_year_closed: Decimal,
    pipeline: Decimal,
    unweighted_pipeline: Decimal,
    monthly_closed: [Decimal; MONTHS_PER_YEAR],
}

impl Totals {
    fn absorb(&mut self, other: &Totals) {
        self.quota += other.quota;
        self.closed += other.closed;
        self.previous_year_closed += other.previous_year_closed;
        self.pipeline += other.pipeline;
        self.unweighted_pipeline += other.unweighted_pipeline;
        for (month, closed) in self.monthly_closed.iter_mut().zip(other.monthly_closed.iter()) {
            *month += *closed;
        }
    }

    fn forecast(&self) -> Decimal {
        self.closed + self.pipeline
    }
}

struct OrgChart<'a> {
    members: BTreeMap<&'a str, &'a SalesRosterRecord>,
    reports: HashMap<&'a str, Vec<&'a str>>,
    managers: HashMap<&'a str, &'a str>,
    roots: Vec<&'a str>,
}

impl<'a> OrgChart<'a> {
    fn new(roster: &'a [SalesRosterRecord]) -> Self {
        let mut members: BTreeMap<&'a str, &'a SalesRosterRecord> = BTreeMap::new();
        for record in roster {
            members.entry(record.id.trim()).or_insert(record);
        }

        let mut reports: HashMap<&'a str, Vec<&'a str>> = HashMap::new();
        let mut managers = HashMap::new();
        let mut roots = Vec::new();
        for (id, record) in &members {
            let manager = record
                .manager_id
                .as_deref()
                .map(str::trim)
                .filter(|manager| !manager.is_empty() && manager != id)
                .and_then(|manager| members.get_key_value(manager).map(|(key, _)| *key));
            match manager {
                Some(manager) => {
                    reports.entry(manager).or_default().push(*id);
                    managers.insert(*id, manager);
                }
                None => roots.push(*id),
            }
        }

        let by_name = |left: &&'a str, right: &&'a str| {
            let (left_record, right_record) = (members[*left], members[*right]);
            left_record
                .name
                .trim()
                .to_ascii_lowercase()
                .cmp(&right_record.name.trim().to_ascii_lowercase())
                .then_with(|| left.cmp(right))
        };
        roots.sort_by(by_name);
        for children in reports.values_mut() {
            children.sort_by(|left, right| {
                members[*right]
                    .is_manager
                    .cmp(&members[*left].is_manager)
                    .then_with(|| by_name(left, right))
            });
        }

        Self { members, reports, managers, roots }
    }

    fn children(&self, id: &str) -> &[&'a str] {
        self.reports.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Depth-first order with levels. Members only reachable through a
    /// cycle are appended afterwards as extra roots.
    fn ordered(&self) -> Vec<(&'a str, u32)> {
        let mut visited = HashSet::new();
        let mut order = Vec::with_capacity(self.members.len());
        for root in &self.roots {
            self.visit(*root, 0, &mut visited, &mut order);
        }

        let mut leftovers: Vec<&'a str> =
            self.members.keys().copied().filter(|id| !visited.contains(id)).collect();
        leftovers.sort_by(|left, right| {
            self.members[*left].name.cmp(&self.members[*right].name).then_with(|| left.cmp(right))
        });
        for id in leftovers {
            self.visit(id, 0, &mut visited, &mut order);
        }
        order
    }

    fn visit(
        &self,
        id: &'a str,
        level: u32,
        visited: &mut HashSet<&'a str>,
        order: &mut Vec<(&'a str, u32)>,
    ) {
        if !visited.insert(id) {
            return;
        }
        order.push((id, level));
        for child in self.children(id) {
            self.visit(*child, level + 1, visited, order);
        }
    }

    /// Own totals plus every report's rollup, memoized per call.
    fn rolled_up(
        &self,
        id: &'a str,
        own: &HashMap<&'a str, Totals>,
        memo: &mut HashMap<&'a str, Totals>,
        in_progress: &mut HashSet<&'a str>,
    ) -> Totals {
        if let Some(known) = memo.get(id) {
            return known.clone();
        }
        if !in_progress.insert(id) {
            return Totals::default();
        }

        let mut totals = own.get(id).cloned().unwrap_or_default();
        for child in self.children(id) {
            let child_totals = self.rolled_up(*child, own, memo, in_progress);
            totals.absorb(&child_totals);
        }

        in_progress.remove(id);
        memo.insert(id, totals.clone());
        totals
    }
}

pub struct HistoricalPerformance<'a> {
    records: &'a [HistoricalPerformanceRecord],
    roster: &'a [SalesRosterRecord],
}

impl<'a> HistoricalPerformance<'a> {
    pub fn new(
        records: &'a [HistoricalPerformanceRecord],
        roster: &'a [SalesRosterRecord],
    ) -> Self {
        Self { records, roster }
    }
}

impl PerformanceSource for HistoricalPerformance<'_> {
    fn mode(&self) -> PerformanceMode {
        PerformanceMode::Historical
    }

    fn rows(&self, year: i32) -> Vec<SalespersonPerformance> {
        self.records
            .iter()
            .filter(|record| record.year == year)
            .map(|record| {
                let id = record.salesperson_id.trim();
                let roster = self.roster.iter().find(|member| member.id.trim() == id);
                let mut monthly_closed = [Decimal::ZERO; MONTHS_PER_YEAR];
                if let Some(reported) = &record.monthly_closed {
                    for (slot, closed) in monthly_closed.iter_mut().zip(reported.iter()) {
                        *slot = *closed;
                    }
                }
                let totals = Totals {
                    quota: record.quota,
                    closed: record.closed,
                    previous_year_closed: record.previous_year_closed,
                    pipeline: record.pipeline,
                    unweighted_pipeline: record.unweighted_pipeline,
                    monthly_closed,
                };
                let mut row = performance_row(
                    id,
                    &record.name,
                    &record.region,
                    roster.is_some_and(|member| member.is_manager),
                    roster
                        .and_then(|member| member.manager_id.as_deref())
                        .map(str::trim)
                        .filter(|manager| !manager.is_empty() && *manager != id),
                    0,
                    &totals,
                );
                // Reported forecasts stand as delivered.
                row.forecast = record.forecast;
                row.forecast_attainment = percentage(record.forecast, record.quota);
                row
            })
            .collect()
    }
}

pub struct ComputedPerformance<'a> {
    roster: &'a [SalesRosterRecord],
    quotas: &'a [QuotaRecord],
    opportunities: &'a [Opportunity],
    filter: &'a FilterSpec,
}

impl<'a> ComputedPerformance<'a> {
    pub fn new(
        roster: &'a [SalesRosterRecord],
        quotas: &'a [QuotaRecord],
        opportunities: &'a [Opportunity],
        filter: &'a FilterSpec,
    ) -> Self {
        Self { roster, quotas, opportunities, filter }
    }

    /// Per-owner totals keyed by trimmed, lowercased owner name.
    fn totals_by_owner(&self, year: i32) -> HashMap<String, Totals> {
        let revenue_type = self.filter.revenue_type();
        let current = self.filter.with_years(vec![year]);
        let prior = self.filter.with_years(vec![year - 1]);

        let mut by_owner: HashMap<String, Totals> = HashMap::new();
        for opportunity in self.opportunities {
            let in_current = current.matches(opportunity);
            let in_prior = prior.matches(opportunity);
            if !in_current && !in_prior {
                continue;
            }
            let totals = by_owner.entry(owner_key(&opportunity.owner)).or_default();

            if opportunity.status == OpportunityStatus::Won {
                let closed = closed_value(opportunity, revenue_type);
                if in_current {
                    totals.closed += closed;
                    if let Some(date) = opportunity.expected_close_date {
                        totals.monthly_closed[date.month0() as usize] += closed;
                    }
                }
                if in_prior {
                    totals.previous_year_closed += closed;
                }
            } else if in_current && opportunity.counts_toward_forecast() {
                totals.pipeline += forecast_pipeline_value(opportunity, revenue_type);
                totals.unweighted_pipeline += nominal_value(opportunity, revenue_type);
            }
        }
        by_owner
    }
}

impl PerformanceSource for ComputedPerformance<'_> {
    fn mode(&self) -> PerformanceMode {
        PerformanceMode::Computed
    }

    fn rows(&self, year: i32) -> Vec<SalespersonPerformance> {
        let chart = OrgChart::new(self.roster);
        let by_owner = self.totals_by_owner(year);

        let mut own: HashMap<&str, Totals> = HashMap::new();
        for (id, member) in &chart.members {
            let mut totals = by_owner.get(&owner_key(&member.name)).cloned().unwrap_or_default();
            totals.quota = self
                .quotas
                .iter()
                .filter(|quota| quota.year == year && quota.salesperson_id.trim() == *id)
                .map(|quota| quota.quota)
                .sum();
            own.insert(*id, totals);
        }

        let mut memo = HashMap::new();
        let mut in_progress = HashSet::new();
        chart
            .ordered()
            .into_iter()
            .map(|(id, level)| {
                let member = chart.members[id];
                let totals = chart.rolled_up(id, &own, &mut memo, &mut in_progress);
                performance_row(
                    id,
                    &member.name,
                    &member.region,
                    member.is_manager,
                    chart.managers.get(id).copied(),
                    level,
                    &totals,
                )
            })
            .collect()
    }
}

fn owner_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn performance_row(
    id: &str,
    name: &str,
    region: &str,
    is_manager: bool,
    manager_id: Option<&str>,
    level: u32,
    totals: &Totals,
) -> SalespersonPerformance {
    let forecast = totals.forecast();
    SalespersonPerformance {
        id: SalespersonId(id.to_owned()),
        name: name.trim().to_owned(),
        region: region.trim().to_owned(),
        is_manager,
        manager_id: manager_id.map(|manager| SalespersonId(manager.to_owned())),
        level,
        quota: totals.quota,
        closed_ytd: totals.closed,
        previous_year_closed: totals.previous_year_closed,
        pipeline_value: totals.pipeline,
        unweighted_pipeline: totals.unweighted_pipeline,
        forecast,
        monthly_closed: totals.monthly_closed.to_vec(),
        monthly_attainment: totals
            .monthly_closed
            .iter()
            .map(|closed| percentage(*closed, totals.quota))
            .collect(),
        pipeline_coverage: ratio(totals.closed + totals.unweighted_pipeline, totals.quota),
        forecast_attainment: percentage(forecast, totals.quota),
    }
}

pub fn performance_source<'a>(
    dataset: &'a SourceDataset,
    opportunities: &'a [Opportunity],
    filter: &'a FilterSpec,
    year: i32,
) -> Box<dyn PerformanceSource + 'a> {
    if dataset.has_historical_performance(year) {
        Box::new(HistoricalPerformance::new(&dataset.historical_performance, &dataset.sales_roster))
    } else {
        Box::new(ComputedPerformance::new(
            &dataset.sales_roster,
            &dataset.quotas,
            opportunities,
            filter,
        ))
    }
}

pub fn sales_rep_performance(
    dataset: &SourceDataset,
    opportunities: &[Opportunity],
    filter: &FilterSpec,
    year: i32,
) -> SalesRepPerformanceReport {
    let source = performance_source(dataset, opportunities, filter, year);
    let mode = source.mode();
    let rows = source.rows(year);
    tracing::debug!(
        event_name = "analytics.rollup.mode_selected",
        year,
        mode = ?mode,
        rows = rows.len(),
        "sales rep performance resolved"
    );
    SalesRepPerformanceReport { year, mode, rows }
}

pub fn heatmap(report: &SalesRepPerformanceReport) -> SalesRepHeatmap {
    SalesRepHeatmap {
        year: report.year,
        mode: report.mode,
        rows: report
            .rows
            .iter()
            .map(|row| HeatmapRow {
                id: row.id.clone(),
                name: row.name.clone(),
                level: row.level,
                monthly_attainment: row.monthly_attainment.clone(),
            })
            .collect(),
    }
}

pub fn find_sales_rep(
    report: &SalesRepPerformanceReport,
    id: &SalespersonId,
) -> Result<SalespersonPerformance, DomainError> {
    let wanted = id.0.trim();
    report
        .rows
        .iter()
        .find(|row| row.id.0 == wanted)
        .cloned()
        .ok_or_else(|| DomainError::SalespersonNotFound(id.clone()))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{find_sales_rep, heatmap, sales_rep_performance};
    use crate::analytics::filter::FilterSpec;
    use crate::analytics::test_support::{opportunity, quota, roster};
    use crate::domain::opportunity::{Opportunity, OpportunityStatus};
    use crate::domain::salesperson::{PerformanceMode, SalespersonId, SalespersonPerformance};
    use crate::domain::source::{HistoricalPerformanceRecord, SourceDataset};
    use crate::errors::DomainError;

    fn owned(
        id: &str,
        owner: &str,
        status: OpportunityStatus,
        amount: i64,
        date: &str,
    ) -> Opportunity {
        let mut deal = opportunity(id, status, amount, 0, date);
        deal.owner = owner.to_owned();
        deal
    }

    fn row<'r>(rows: &'r [SalespersonPerformance], id: &str) -> &'r SalespersonPerformance {
        rows.iter().find(|row| row.id.0 == id).expect("row present")
    }

    fn org() -> SourceDataset {
        SourceDataset {
            sales_roster: vec![
                roster("VP", "Vera Page", None, true),
                roster("M1", "Mona Diaz", Some("VP"), true),
                roster("R1", "Ravi Shah", Some("M1"), false),
                roster("R2", "Alma Cruz", Some("M1"), false),
                roster("R3", "Bo Lind", Some("VP"), false),
            ],
            quotas: vec![
                quota("M1", 2026, 100),
                quota("R1", 2026, 1_000),
                quota("R2", 2026, 2_000),
                quota("R3", 2026, 500),
            ],
            ..SourceDataset::default()
        }
    }

    fn book() -> Vec<Opportunity> {
        vec![
            owned("W1", " ravi shah ", OpportunityStatus::Won, 400, "2026-01-20"),
            owned("W2", "Alma Cruz", OpportunityStatus::Won, 600, "2026-03-02"),
            owned("W3", "Mona Diaz", OpportunityStatus::Won, 50, "2026-03-15"),
            owned("W0", "Ravi Shah", OpportunityStatus::Won, 300, "2025-06-01"),
            owned("A1", "Ravi Shah", OpportunityStatus::Active, 200, "2026-09-01"),
        ]
    }

    #[test]
    fn manager_totals_roll_up_direct_and_indirect_reports() {
        let dataset = org();
        let report = sales_rep_performance(&dataset, &book(), &FilterSpec::default(), 2026);
        assert_eq!(report.mode, PerformanceMode::Computed);

        let ravi = row(&report.rows, "R1");
        let alma = row(&report.rows, "R2");
        let mona = row(&report.rows, "M1");
        let vera = row(&report.rows, "VP");

        assert_eq!(ravi.closed_ytd, Decimal::from(400));
        assert_eq!(ravi.previous_year_closed, Decimal::from(300));
        assert_eq!(ravi.pipeline_value, Decimal::from(200));
        assert_eq!(ravi.unweighted_pipeline, Decimal::from(400));
        assert_eq!(ravi.forecast, Decimal::from(600));
        assert_eq!(ravi.monthly_attainment[0], Decimal::from(40));
        assert_eq!(ravi.pipeline_coverage, Decimal::new(8, 1));
        assert_eq!(ravi.forecast_attainment, Decimal::from(60));

        assert_eq!(mona.closed_ytd, ravi.closed_ytd + alma.closed_ytd + Decimal::from(50));
        assert_eq!(mona.quota, ravi.quota + alma.quota + Decimal::from(100));
        assert_eq!(mona.monthly_closed[2], Decimal::from(650));
        assert_eq!(vera.closed_ytd, Decimal::from(1_050));
        assert_eq!(vera.quota, Decimal::from(3_600));
    }

    #[test]
    fn output_is_depth_first_with_managers_before_reports() {
        let dataset = org();
        let report = sales_rep_performance(&dataset, &book(), &FilterSpec::default(), 2026);
        let order: Vec<(&str, u32)> =
            report.rows.iter().map(|row| (row.id.0.as_str(), row.level)).collect();

        assert_eq!(order, vec![("VP", 0), ("M1", 1), ("R2", 2), ("R1", 2), ("R3", 1)]);
    }

    #[test]
    fn reporting_cycles_terminate_and_are_appended() {
        let mut dataset = org();
        dataset.sales_roster.push(roster("X1", "Xan", Some("X2"), true));
        dataset.sales_roster.push(roster("X2", "Yul", Some("X1"), true));
        dataset.sales_roster.push(roster("S1", "Sol", Some("S1"), false));

        let report = sales_rep_performance(&dataset, &[], &FilterSpec::default(), 2026);
        let ids: Vec<&str> = report.rows.iter().map(|row| row.id.0.as_str()).collect();

        assert_eq!(ids.len(), 8);
        assert_eq!(&ids[ids.len() - 2..], &["X1", "X2"]);
        assert!(ids.contains(&"S1"), "self-managed member becomes a root");
        assert_eq!(row(&report.rows, "S1").level, 0);
    }

    #[test]
    fn historical_rows_are_emitted_as_reported() {
        let mut dataset = org();
        dataset.historical_performance = vec![HistoricalPerformanceRecord {
            year: 2024,
            salesperson_id: "R1".to_owned(),
            name: "Ravi Shah".to_owned(),
            region: "EMEA".to_owned(),
            quota: Decimal::from(1_000),
            closed: Decimal::from(900),
            previous_year_closed: Decimal::from(700),
            pipeline: Decimal::from(50),
            unweighted_pipeline: Decimal::from(100),
            forecast: Decimal::from(950),
            monthly_closed: Some(vec![Decimal::from(100); 12]),
        }];

        let report = sales_rep_performance(&dataset, &book(), &FilterSpec::default(), 2024);
        assert_eq!(report.mode, PerformanceMode::Historical);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].level, 0);
        assert_eq!(report.rows[0].forecast_attainment, Decimal::from(95));
        assert_eq!(report.rows[0].pipeline_coverage, Decimal::ONE);

        let map = heatmap(&report);
        assert_eq!(map.rows[0].monthly_attainment, vec![Decimal::from(10); 12]);
    }

    #[test]
    fn zero_quota_guards_derived_ratios() {
        let dataset = org();
        let report = sales_rep_performance(&dataset, &book(), &FilterSpec::default(), 2030);
        assert!(report
            .rows
            .iter()
            .all(|row| row.forecast_attainment.is_zero() && row.pipeline_coverage.is_zero()));
    }

    #[test]
    fn unknown_rep_is_not_found() {
        let dataset = org();
        let report = sales_rep_performance(&dataset, &book(), &FilterSpec::default(), 2026);

        assert!(find_sales_rep(&report, &SalespersonId("R3".to_owned())).is_ok());
        let missing = find_sales_rep(&report, &SalespersonId("ZZ".to_owned()));
        assert!(matches!(missing, Err(DomainError::SalespersonNotFound(_))));
    }
}
