//! Revenue-type-aware value extraction.
//!
//! Every monetary figure the engine reports goes through [`value`] or
//! [`closed_value`] so that one revenue-type toggle governs every KPI,
//! chart and table.

use rust_decimal::Decimal;

use crate::domain::opportunity::{LogoType, Opportunity, OpportunityStatus, RevenueType};
use crate::domain::source::PipelineSnapshotRecord;

/// Anything carrying a licence and an implementation component.
pub trait Valued {
    fn license_value(&self) -> Decimal;
    fn implementation_value(&self) -> Decimal;
}

impl Valued for Opportunity {
    fn license_value(&self) -> Decimal {
        self.license_value
    }

    fn implementation_value(&self) -> Decimal {
        self.implementation_value
    }
}

impl Valued for PipelineSnapshotRecord {
    fn license_value(&self) -> Decimal {
        self.license_value
    }

    fn implementation_value(&self) -> Decimal {
        self.implementation_value
    }
}

pub fn value<T: Valued + ?Sized>(item: &T, revenue_type: RevenueType) -> Decimal {
    match revenue_type {
        RevenueType::License => item.license_value(),
        RevenueType::Implementation => item.implementation_value(),
        RevenueType::All => item.license_value() + item.implementation_value(),
    }
}

/// Closed ACV contribution of a deal under the revenue-type toggle. Licence
/// value only counts for licence-eligible logo types; non-won deals are zero.
pub fn closed_value(opportunity: &Opportunity, revenue_type: RevenueType) -> Decimal {
    if opportunity.status != OpportunityStatus::Won {
        return Decimal::ZERO;
    }
    closed_acv_components(
        opportunity.logo_type,
        opportunity.license_value,
        opportunity.implementation_value,
        revenue_type,
    )
}

pub fn closed_acv_components(
    logo_type: LogoType,
    license_value: Decimal,
    implementation_value: Decimal,
    revenue_type: RevenueType,
) -> Decimal {
    let license = if logo_type.is_licence_acv_eligible() { license_value } else { Decimal::ZERO };
    match revenue_type {
        RevenueType::License => license,
        RevenueType::Implementation => implementation_value,
        RevenueType::All => license + implementation_value,
    }
}

/// Weighted pipeline contribution: open, non-expansion deals only.
pub fn forecast_pipeline_value(opportunity: &Opportunity, revenue_type: RevenueType) -> Decimal {
    if opportunity.counts_toward_forecast() {
        value(opportunity, revenue_type)
    } else {
        Decimal::ZERO
    }
}

/// Recovers the nominal deal size from a probability-weighted value.
/// A zero probability cannot be un-weighted and contributes nothing.
pub fn unweight(weighted: Decimal, probability: Decimal) -> Decimal {
    if probability <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (weighted * Decimal::ONE_HUNDRED / probability).round_dp(2)
}

/// Unweighted size of an open deal under the revenue-type toggle. Deals
/// without a probability are reported at their recorded value.
pub fn nominal_value(opportunity: &Opportunity, revenue_type: RevenueType) -> Decimal {
    let weighted = value(opportunity, revenue_type);
    if opportunity.probability > Decimal::ZERO {
        unweight(weighted, opportunity.probability)
    } else {
        weighted
    }
}

pub fn percentage(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }
    (numerator * Decimal::ONE_HUNDRED / denominator).round_dp(2)
}

pub fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }
    (numerator / denominator).round_dp(4)
}

/// Year-over-year growth in percent; zero when there is no prior value.
pub fn growth(current: Decimal, prior: Decimal) -> Decimal {
    percentage(current - prior, prior)
}
