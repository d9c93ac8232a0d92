//! Turns raw source records into the canonical [`Opportunity`] set.
//!
//! The builder indexes the lookup tables (contract mappings, sub-category
//! attributions, category names) once per call and then:
//!
//! - converts every closed-deal row into a `Won` opportunity, and
//! - converts the rows of the latest snapshot month into `Active`, `Stalled`
//!   or `Lost` opportunities, skipping `Closed Won` rows which belong to the
//!   closed-deal side.
//!
//! Rows whose snapshot month is missing or unparseable are skipped, never
//! fatal. The same index also resolves raw snapshot rows into
//! [`SnapshotView`]s for the engines that scan snapshot history.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::analytics::filter::DealAttributes;
use crate::analytics::valuation::closed_acv_components;
use crate::domain::calendar::{parse_optional_date, ReportingMonth};
use crate::domain::opportunity::{
    LogoType, Opportunity, OpportunityId, OpportunityStatus, RevenueType, Stage, SubCategoryShare,
};
use crate::domain::source::{
    ClosedDealRecord, ContractMappingRecord, PipelineSnapshotRecord, SourceDataset,
    SubCategoryAttributionRecord,
};

/// Region/vertical/segment after contract-mapping enrichment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedAttributes<'a> {
    pub region: &'a str,
    pub vertical: &'a str,
    pub segment: &'a str,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attribution {
    pub sub_category: Option<String>,
    pub category: Option<String>,
    pub breakdown: Vec<SubCategoryShare>,
}

/// A raw snapshot row with its month parsed, stage classified and
/// attributes resolved.
#[derive(Clone, Debug)]
pub struct SnapshotView<'a> {
    pub record: &'a PipelineSnapshotRecord,
    pub month: ReportingMonth,
    pub stage: Stage,
    pub logo_type: LogoType,
    pub attributes: ResolvedAttributes<'a>,
    pub close_date: Option<NaiveDate>,
    pub product_category: Option<String>,
    pub product_sub_category: Option<String>,
}

impl DealAttributes for SnapshotView<'_> {
    fn region(&self) -> &str {
        self.attributes.region
    }

    fn vertical(&self) -> &str {
        self.attributes.vertical
    }

    fn segment(&self) -> &str {
        self.attributes.segment
    }

    fn logo_type(&self) -> LogoType {
        self.logo_type
    }

    fn sold_by(&self) -> &str {
        &self.record.sold_by
    }

    fn product_category(&self) -> Option<&str> {
        self.product_category.as_deref()
    }

    fn product_sub_category(&self) -> Option<&str> {
        self.product_sub_category.as_deref()
    }

    fn close_date(&self) -> Option<NaiveDate> {
        self.close_date
    }
}

pub struct OpportunityBuilder<'a> {
    dataset: &'a SourceDataset,
    contracts: HashMap<&'a str, &'a ContractMappingRecord>,
    attributions: HashMap<(&'a str, i32), Vec<&'a SubCategoryAttributionRecord>>,
    categories: HashMap<String, &'a str>,
}

impl<'a> OpportunityBuilder<'a> {
    pub fn new(dataset: &'a SourceDataset) -> Self {
        let contracts = dataset
            .contract_mappings
            .iter()
            .map(|mapping| (mapping.contract_id.trim(), mapping))
            .collect();

        let mut attributions: HashMap<(&'a str, i32), Vec<&'a SubCategoryAttributionRecord>> =
            HashMap::new();
        for row in &dataset.sub_category_attributions {
            attributions.entry((row.contract_id.trim(), row.year)).or_default().push(row);
        }
        for rows in attributions.values_mut() {
            // Highest share first; name breaks ties so the primary pick is stable.
            rows.sort_by(|left, right| {
                right
                    .percentage
                    .cmp(&left.percentage)
                    .then_with(|| left.sub_category.cmp(&right.sub_category))
            });
        }

        let categories = dataset
            .category_mappings
            .iter()
            .map(|row| (normalize_key(&row.sub_category), row.category.as_str()))
            .collect();

        Self { dataset, contracts, attributions, categories }
    }

    /// Closed deals followed by the latest snapshot month's pipeline.
    pub fn build(&self) -> Vec<Opportunity> {
        let mut opportunities: Vec<Opportunity> =
            self.dataset.closed_deals.iter().map(|record| self.from_closed_deal(record)).collect();
        let closed_count = opportunities.len();

        let latest = latest_snapshot_month(&self.dataset.pipeline_snapshots);
        let mut skipped = 0_usize;
        if let Some(latest) = latest {
            for record in &self.dataset.pipeline_snapshots {
                match ReportingMonth::parse(record.snapshot_month.as_deref().unwrap_or_default()) {
                    Some(month) if month == latest => {
                        if let Some(opportunity) = self.from_snapshot(record, month) {
                            opportunities.push(opportunity);
                        }
                    }
                    Some(_) => {}
                    None => skipped += 1,
                }
            }
        } else {
            skipped = self.dataset.pipeline_snapshots.len();
        }

        tracing::debug!(
            event_name = "analytics.builder.completed",
            closed = closed_count,
            pipeline = opportunities.len() - closed_count,
            skipped_rows = skipped,
            latest_month = latest.map(|month| month.to_string()).unwrap_or_default(),
            "opportunity set built"
        );

        opportunities
    }

    pub fn from_closed_deal(&self, record: &ClosedDealRecord) -> Opportunity {
        let contract_id = non_blank(record.contract_id.as_deref());
        let attributes =
            self.resolve_attributes(contract_id, &record.region, &record.vertical, &record.segment);
        let logo_type = LogoType::parse(&record.logo_type);
        let close_date = parse_optional_date(record.close_date.as_deref());
        let deal_value = record.license_value + record.implementation_value;
        let attribution = match (contract_id, close_date) {
            (Some(contract_id), Some(date)) => self.attribution(contract_id, date.year(), deal_value),
            _ => Attribution::default(),
        };

        Opportunity {
            id: OpportunityId(record.deal_id.trim().to_owned()),
            name: record.deal_name.clone(),
            account_name: record.account_name.clone(),
            region: attributes.region.to_owned(),
            vertical: attributes.vertical.to_owned(),
            segment: attributes.segment.to_owned(),
            stage: Stage::ClosedWon,
            stage_label: Stage::ClosedWon.label().to_owned(),
            probability: Decimal::ONE_HUNDRED,
            deal_value,
            license_value: record.license_value,
            implementation_value: record.implementation_value,
            weighted_value: deal_value,
            expected_close_date: close_date,
            created_date: parse_optional_date(record.created_date.as_deref()),
            snapshot_month: None,
            owner: record.owner.clone(),
            status: OpportunityStatus::Won,
            logo_type,
            closed_acv: closed_acv_components(
                logo_type,
                record.license_value,
                record.implementation_value,
                RevenueType::All,
            ),
            sold_by: record.sold_by.clone(),
            sow_id: contract_id.map(str::to_owned),
            product_sub_category: attribution.sub_category,
            product_category: attribution.category,
            sub_category_breakdown: attribution.breakdown,
            revenue_type: self.revenue_type(
                contract_id,
                record.license_value,
                record.implementation_value,
            ),
        }
    }

    /// `None` for `Closed Won` rows; those deals come from the closed ledger.
    pub fn from_snapshot(
        &self,
        record: &PipelineSnapshotRecord,
        month: ReportingMonth,
    ) -> Option<Opportunity> {
        let stage = Stage::parse(&record.stage);
        let status = stage.pipeline_status()?;
        let contract_id = non_blank(record.contract_id.as_deref());
        let attributes =
            self.resolve_attributes(contract_id, &record.region, &record.vertical, &record.segment);
        let close_date = parse_optional_date(record.expected_close_date.as_deref());
        let attribution = self.snapshot_attribution(record, month, close_date);
        let probability = if status == OpportunityStatus::Lost {
            Decimal::ZERO
        } else {
            record.probability.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
        };

        Some(Opportunity {
            id: OpportunityId(record.deal_id.trim().to_owned()),
            name: record.deal_name.clone(),
            account_name: record.account_name.clone(),
            region: attributes.region.to_owned(),
            vertical: attributes.vertical.to_owned(),
            segment: attributes.segment.to_owned(),
            stage,
            stage_label: record.stage.trim().to_owned(),
            probability,
            deal_value: record.deal_value,
            license_value: record.license_value,
            implementation_value: record.implementation_value,
            weighted_value: record.license_value + record.implementation_value,
            expected_close_date: close_date,
            created_date: parse_optional_date(record.created_date.as_deref()),
            snapshot_month: Some(month),
            owner: record.owner.clone(),
            status,
            logo_type: LogoType::parse(&record.logo_type),
            closed_acv: Decimal::ZERO,
            sold_by: record.sold_by.clone(),
            sow_id: contract_id.map(str::to_owned),
            product_sub_category: attribution.sub_category,
            product_category: attribution.category,
            sub_category_breakdown: attribution.breakdown,
            revenue_type: self.revenue_type(
                contract_id,
                record.license_value,
                record.implementation_value,
            ),
        })
    }

    /// Every snapshot row with a parseable month, in source order.
    pub fn snapshot_views(&self) -> Vec<SnapshotView<'a>> {
        self.dataset
            .pipeline_snapshots
            .iter()
            .filter_map(|record| {
                let month = ReportingMonth::parse(record.snapshot_month.as_deref()?)?;
                Some(self.snapshot_view(record, month))
            })
            .collect()
    }

    fn snapshot_view(
        &self,
        record: &'a PipelineSnapshotRecord,
        month: ReportingMonth,
    ) -> SnapshotView<'a> {
        let contract_id = non_blank(record.contract_id.as_deref());
        let close_date = parse_optional_date(record.expected_close_date.as_deref());
        let attribution = self.snapshot_attribution(record, month, close_date);

        SnapshotView {
            record,
            month,
            stage: Stage::parse(&record.stage),
            logo_type: LogoType::parse(&record.logo_type),
            attributes: self.resolve_attributes(
                contract_id,
                &record.region,
                &record.vertical,
                &record.segment,
            ),
            close_date,
            product_category: attribution.category,
            product_sub_category: attribution.sub_category,
        }
    }

    /// Contract mapping wins field by field; blanks fall back to the record.
    pub fn resolve_attributes(
        &self,
        contract_id: Option<&str>,
        region: &'a str,
        vertical: &'a str,
        segment: &'a str,
    ) -> ResolvedAttributes<'a> {
        let mapping = contract_id.and_then(|id| self.contracts.get(id.trim()).copied());
        let pick = |mapped: Option<&'a String>, fallback: &'a str| -> &'a str {
            mapped.map(|value| value.trim()).filter(|value| !value.is_empty()).unwrap_or(fallback.trim())
        };

        ResolvedAttributes {
            region: pick(mapping.and_then(|m| m.region.as_ref()), region),
            vertical: pick(mapping.and_then(|m| m.vertical.as_ref()), vertical),
            segment: pick(mapping.and_then(|m| m.segment.as_ref()), segment),
        }
    }

    /// Sub-category split for a contract in a given year. The primary
    /// sub-category is the one with the largest share.
    pub fn attribution(&self, contract_id: &str, year: i32, deal_value: Decimal) -> Attribution {
        let Some(rows) = self.attributions.get(&(contract_id.trim(), year)) else {
            return Attribution::default();
        };

        let breakdown: Vec<SubCategoryShare> = rows
            .iter()
            .map(|row| SubCategoryShare {
                sub_category: row.sub_category.trim().to_owned(),
                category: self.category_for(&row.sub_category).map(str::to_owned),
                percentage: row.percentage,
                value: (deal_value * row.percentage / Decimal::ONE_HUNDRED).round_dp(2),
            })
            .collect();

        let primary = breakdown.first();
        Attribution {
            sub_category: primary.map(|share| share.sub_category.clone()),
            category: primary.and_then(|share| share.category.clone()),
            breakdown,
        }
    }

    pub fn category_for(&self, sub_category: &str) -> Option<&'a str> {
        self.categories.get(&normalize_key(sub_category)).copied()
    }

    fn snapshot_attribution(
        &self,
        record: &PipelineSnapshotRecord,
        month: ReportingMonth,
        close_date: Option<NaiveDate>,
    ) -> Attribution {
        match non_blank(record.contract_id.as_deref()) {
            Some(contract_id) => {
                let year = close_date.map(|date| date.year()).unwrap_or(month.year);
                self.attribution(contract_id, year, record.deal_value)
            }
            None => Attribution::default(),
        }
    }

    fn revenue_type(
        &self,
        contract_id: Option<&str>,
        license_value: Decimal,
        implementation_value: Decimal,
    ) -> RevenueType {
        contract_id
            .and_then(|id| self.contracts.get(id.trim()))
            .and_then(|mapping| mapping.revenue_type.as_deref())
            .and_then(|raw| raw.parse::<RevenueType>().ok())
            .unwrap_or_else(|| RevenueType::infer(license_value, implementation_value))
    }
}

pub fn build_opportunities(dataset: &SourceDataset) -> Vec<Opportunity> {
    OpportunityBuilder::new(dataset).build()
}

pub fn latest_snapshot_month(records: &[PipelineSnapshotRecord]) -> Option<ReportingMonth> {
    records
        .iter()
        .filter_map(|record| ReportingMonth::parse(record.snapshot_month.as_deref()?))
        .max()
}

/// Distinct parseable snapshot months, ascending.
pub fn snapshot_months(records: &[PipelineSnapshotRecord]) -> Vec<ReportingMonth> {
    let months: BTreeMap<ReportingMonth, ()> = records
        .iter()
        .filter_map(|record| ReportingMonth::parse(record.snapshot_month.as_deref()?))
        .map(|month| (month, ()))
        .collect();
    months.into_keys().collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn normalize_key(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}
