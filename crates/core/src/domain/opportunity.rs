use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::calendar::ReportingMonth;
use crate::errors::DomainError;

/// Stage label prefix a comparison-month row must carry to count as a won
/// deal in pipeline movement.
pub const WON_STAGE_MARKER: &str = "Closed Won";

pub const EXTENSION_RENEWAL_BUCKET: &str = "Extension/Renewal";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpportunityId(pub String);

impl fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpportunityStatus {
    Active,
    Won,
    Lost,
    Stalled,
}

impl OpportunityStatus {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Active | Self::Stalled)
    }
}

/// Sales stage parsed once from the free-text CRM label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Prospecting,
    Qualification,
    Discovery,
    Solutioning,
    Proposal,
    Negotiation,
    Commit,
    Other,
    Stalled,
    ClosedWon,
    ClosedLost,
    ClosedDead,
    ClosedDeclined,
}

impl Stage {
    pub const OPEN_FUNNEL: [Stage; 9] = [
        Stage::Prospecting,
        Stage::Qualification,
        Stage::Discovery,
        Stage::Solutioning,
        Stage::Proposal,
        Stage::Negotiation,
        Stage::Commit,
        Stage::Other,
        Stage::Stalled,
    ];

    pub fn parse(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase();

        // Terminal stages first: "Closed Lost - Negotiation" is lost, not negotiating.
        if normalized.contains("closed won") || normalized == "won" {
            Self::ClosedWon
        } else if normalized.contains("closed lost") || normalized == "lost" {
            Self::ClosedLost
        } else if normalized.contains("dead") {
            Self::ClosedDead
        } else if normalized.contains("declined") {
            Self::ClosedDeclined
        } else if normalized.contains("stalled") {
            Self::Stalled
        } else if normalized.contains("prospect") {
            Self::Prospecting
        } else if normalized.contains("qualif") {
            Self::Qualification
        } else if normalized.contains("discover") {
            Self::Discovery
        } else if normalized.contains("solution") || normalized.contains("demo") {
            Self::Solutioning
        } else if normalized.contains("proposal") {
            Self::Proposal
        } else if normalized.contains("negotiat") {
            Self::Negotiation
        } else if normalized.contains("commit") {
            Self::Commit
        } else {
            Self::Other
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Prospecting => "Prospecting",
            Self::Qualification => "Qualification",
            Self::Discovery => "Discovery",
            Self::Solutioning => "Solutioning",
            Self::Proposal => "Proposal",
            Self::Negotiation => "Negotiation",
            Self::Commit => "Commit",
            Self::Other => "Other",
            Self::Stalled => "Stalled",
            Self::ClosedWon => "Closed Won",
            Self::ClosedLost => "Closed Lost",
            Self::ClosedDead => "Closed Dead",
            Self::ClosedDeclined => "Closed Declined",
        }
    }

    pub fn is_lost(self) -> bool {
        matches!(self, Self::ClosedLost | Self::ClosedDead | Self::ClosedDeclined)
    }

    pub fn is_closed(self) -> bool {
        self == Self::ClosedWon || self.is_lost()
    }

    /// Status a pipeline row with this stage carries. Won rows never become
    /// pipeline opportunities, so `None` tells the builder to skip them.
    pub fn pipeline_status(self) -> Option<OpportunityStatus> {
        match self {
            Self::ClosedWon => None,
            stage if stage.is_lost() => Some(OpportunityStatus::Lost),
            Self::Stalled => Some(OpportunityStatus::Stalled),
            _ => Some(OpportunityStatus::Active),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogoType {
    #[serde(rename = "New Logo")]
    NewLogo,
    Upsell,
    #[serde(rename = "Cross-Sell")]
    CrossSell,
    Extension,
    Renewal,
}

impl LogoType {
    /// Unknown labels fall back to `NewLogo`; callers that need to know use
    /// [`LogoType::from_label`].
    pub fn parse(label: &str) -> Self {
        Self::from_label(label).unwrap_or(Self::NewLogo)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .map(|ch| ch.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "newlogo" | "new" | "newbusiness" => Some(Self::NewLogo),
            "upsell" => Some(Self::Upsell),
            "crosssell" => Some(Self::CrossSell),
            "extension" => Some(Self::Extension),
            "renewal" => Some(Self::Renewal),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NewLogo => "New Logo",
            Self::Upsell => "Upsell",
            Self::CrossSell => "Cross-Sell",
            Self::Extension => "Extension",
            Self::Renewal => "Renewal",
        }
    }

    /// Reporting bucket; Extension and Renewal share one.
    pub fn bucket(self) -> &'static str {
        if self.is_expansion() {
            EXTENSION_RENEWAL_BUCKET
        } else {
            self.label()
        }
    }

    pub fn is_licence_acv_eligible(self) -> bool {
        matches!(self, Self::NewLogo | Self::Upsell | Self::CrossSell)
    }

    pub fn is_expansion(self) -> bool {
        matches!(self, Self::Extension | Self::Renewal)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevenueType {
    License,
    Implementation,
    #[default]
    All,
}

impl RevenueType {
    pub fn label(self) -> &'static str {
        match self {
            Self::License => "License",
            Self::Implementation => "Implementation",
            Self::All => "All",
        }
    }

    /// Revenue type implied by which value components are present.
    pub fn infer(license_value: Decimal, implementation_value: Decimal) -> Self {
        match (license_value.is_zero(), implementation_value.is_zero()) {
            (false, true) => Self::License,
            (true, false) => Self::Implementation,
            _ => Self::All,
        }
    }
}

impl std::str::FromStr for RevenueType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "license" | "licence" => Ok(Self::License),
            "implementation" | "services" => Ok(Self::Implementation),
            "all" | "" => Ok(Self::All),
            other => Err(DomainError::InvalidFilter(format!(
                "unsupported revenue type `{other}` (expected license|implementation|all)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCategoryShare {
    pub sub_category: String,
    pub category: Option<String>,
    pub percentage: Decimal,
    pub value: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub name: String,
    pub account_name: String,
    pub region: String,
    pub vertical: String,
    pub segment: String,
    pub stage: Stage,
    pub stage_label: String,
    pub probability: Decimal,
    pub deal_value: Decimal,
    pub license_value: Decimal,
    pub implementation_value: Decimal,
    pub weighted_value: Decimal,
    pub expected_close_date: Option<NaiveDate>,
    pub created_date: Option<NaiveDate>,
    pub snapshot_month: Option<ReportingMonth>,
    pub owner: String,
    pub status: OpportunityStatus,
    pub logo_type: LogoType,
    pub closed_acv: Decimal,
    pub sold_by: String,
    pub sow_id: Option<String>,
    pub product_sub_category: Option<String>,
    pub product_category: Option<String>,
    pub sub_category_breakdown: Vec<SubCategoryShare>,
    pub revenue_type: RevenueType,
}

impl Opportunity {
    /// Open pipeline that counts toward the forward-looking forecast.
    /// Extension/Renewal pipeline is already-contracted revenue and stays out.
    pub fn counts_toward_forecast(&self) -> bool {
        self.status.is_open() && !self.logo_type.is_expansion()
    }
}
