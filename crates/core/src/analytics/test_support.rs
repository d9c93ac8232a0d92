//! Record builders shared by the analytics unit tests.

use rust_decimal::Decimal;

use crate::domain::calendar::parse_calendar_date;
use crate::domain::opportunity::{
    LogoType, Opportunity, OpportunityId, OpportunityStatus, RevenueType, Stage,
};
use crate::domain::source::{
    ClosedDealRecord, PipelineSnapshotRecord, QuotaRecord, SalesRosterRecord,
};

pub fn opportunity(
    id: &str,
    status: OpportunityStatus,
    license: i64,
    implementation: i64,
    close_date: &str,
) -> Opportunity {
    let license_value = Decimal::from(license);
    let implementation_value = Decimal::from(implementation);
    let (stage, probability) = match status {
        OpportunityStatus::Won => (Stage::ClosedWon, Decimal::ONE_HUNDRED),
        OpportunityStatus::Lost => (Stage::ClosedLost, Decimal::ZERO),
        OpportunityStatus::Stalled => (Stage::Stalled, Decimal::from(10)),
        OpportunityStatus::Active => (Stage::Proposal, Decimal::from(50)),
    };
    let closed_acv = if status == OpportunityStatus::Won {
        license_value + implementation_value
    } else {
        Decimal::ZERO
    };

    Opportunity {
        id: OpportunityId(id.to_owned()),
        name: format!("{id} deal"),
        account_name: format!("{id} account"),
        region: "North America".to_owned(),
        vertical: "Banking".to_owned(),
        segment: "Enterprise".to_owned(),
        stage,
        stage_label: stage.label().to_owned(),
        probability,
        deal_value: license_value + implementation_value,
        license_value,
        implementation_value,
        weighted_value: license_value + implementation_value,
        expected_close_date: parse_calendar_date(close_date),
        created_date: None,
        snapshot_month: None,
        owner: "Ada Park".to_owned(),
        status,
        logo_type: LogoType::NewLogo,
        closed_acv,
        sold_by: "Direct".to_owned(),
        sow_id: None,
        product_sub_category: None,
        product_category: None,
        sub_category_breakdown: Vec::new(),
        revenue_type: RevenueType::infer(license_value, implementation_value),
    }
}

pub fn closed_deal(
    id: &str,
    owner: &str,
    logo_type: &str,
    license: i64,
    implementation: i64,
    close_date: &str,
) -> ClosedDealRecord {
    ClosedDealRecord {
        deal_id: id.to_owned(),
        deal_name: format!("{id} deal"),
        account_name: format!("{id} account"),
        contract_id: None,
        region: "North America".to_owned(),
        vertical: "Banking".to_owned(),
        segment: "Enterprise".to_owned(),
        logo_type: logo_type.to_owned(),
        owner: owner.to_owned(),
        sold_by: "Direct".to_owned(),
        license_value: Decimal::from(license),
        implementation_value: Decimal::from(implementation),
        close_date: Some(close_date.to_owned()),
        created_date: None,
    }
}

/// Snapshot row whose weighted licence value is `weighted`; implementation
/// is zero so `value(.., All)` equals `weighted`.
pub fn snapshot(
    id: &str,
    month: &str,
    stage: &str,
    weighted: i64,
    probability: i64,
) -> PipelineSnapshotRecord {
    let weighted_value = Decimal::from(weighted);
    let probability = Decimal::from(probability);
    let deal_value = if probability.is_zero() {
        weighted_value
    } else {
        weighted_value * Decimal::ONE_HUNDRED / probability
    };

    PipelineSnapshotRecord {
        deal_id: id.to_owned(),
        deal_name: format!("{id} deal"),
        account_name: format!("{id} account"),
        contract_id: None,
        snapshot_month: Some(month.to_owned()),
        stage: stage.to_owned(),
        probability,
        deal_value,
        license_value: weighted_value,
        implementation_value: Decimal::ZERO,
        expected_close_date: Some("2026-09-30".to_owned()),
        created_date: None,
        region: "North America".to_owned(),
        vertical: "Banking".to_owned(),
        segment: "Enterprise".to_owned(),
        logo_type: "New Logo".to_owned(),
        owner: "Ada Park".to_owned(),
        sold_by: "Direct".to_owned(),
    }
}

pub fn roster(id: &str, name: &str, manager_id: Option<&str>, is_manager: bool) -> SalesRosterRecord {
    SalesRosterRecord {
        id: id.to_owned(),
        name: name.to_owned(),
        region: "North America".to_owned(),
        is_manager,
        manager_id: manager_id.map(str::to_owned),
    }
}

pub fn quota(salesperson_id: &str, year: i32, amount: i64) -> QuotaRecord {
    QuotaRecord { salesperson_id: salesperson_id.to_owned(), year, quota: Decimal::from(amount) }
}
