use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analytics::filter::FilterSpec;
use crate::analytics::valuation::{closed_value, value};
use crate::domain::opportunity::{Opportunity, OpportunityId, OpportunityStatus, RevenueType};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealSortField {
    #[default]
    Value,
    Probability,
    CloseDate,
    Name,
}

impl DealSortField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Probability => "probability",
            Self::CloseDate => "close_date",
            Self::Name => "name",
        }
    }
}

impl fmt::Display for DealSortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealSortField {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "value" => Ok(Self::Value),
            "probability" => Ok(Self::Probability),
            "close_date" | "date" => Ok(Self::CloseDate),
            "name" => Ok(Self::Name),
            other => Err(DomainError::InvalidFilter(format!("unknown sort field `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealQuery {
    pub sort: DealSortField,
    pub direction: SortDirection,
    pub offset: usize,
    /// Falls back to the configured page size when absent.
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Open deals matching the filter.
pub fn key_deals(
    opportunities: &[Opportunity],
    filter: &FilterSpec,
    query: &DealQuery,
    default_limit: usize,
) -> Page<Opportunity> {
    let matching = opportunities
        .iter()
        .filter(|opportunity| opportunity.status.is_open() && filter.matches(*opportunity));
    paginate(matching, filter.revenue_type(), query, default_limit)
}

/// Won deals matching the filter.
pub fn closed_deals(
    opportunities: &[Opportunity],
    filter: &FilterSpec,
    query: &DealQuery,
    default_limit: usize,
) -> Page<Opportunity> {
    let matching = opportunities.iter().filter(|opportunity| {
        opportunity.status == OpportunityStatus::Won && filter.matches(*opportunity)
    });
    paginate(matching, filter.revenue_type(), query, default_limit)
}

pub fn find_deal<'a>(
    opportunities: &'a [Opportunity],
    id: &OpportunityId,
) -> Result<&'a Opportunity, DomainError> {
    let wanted = id.0.trim();
    opportunities
        .iter()
        .find(|opportunity| opportunity.id.0 == wanted)
        .ok_or_else(|| DomainError::DealNotFound(id.clone()))
}

fn sort_value(opportunity: &Opportunity, revenue_type: RevenueType) -> Decimal {
    if opportunity.status == OpportunityStatus::Won {
        closed_value(opportunity, revenue_type)
    } else {
        value(opportunity, revenue_type)
    }
}

fn paginate<'a>(
    matching: impl Iterator<Item = &'a Opportunity>,
    revenue_type: RevenueType,
    query: &DealQuery,
    default_limit: usize,
) -> Page<Opportunity> {
    let mut deals: Vec<&Opportunity> = matching.collect();
    let directed = |ordering: Ordering| match query.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    };
    deals.sort_by(|left, right| {
        let ordering = match query.sort {
            DealSortField::Value => {
                directed(sort_value(left, revenue_type).cmp(&sort_value(right, revenue_type)))
            }
            DealSortField::Probability => directed(left.probability.cmp(&right.probability)),
            DealSortField::CloseDate => compare_dates(left, right, directed),
            DealSortField::Name => directed(
                left.name.to_ascii_lowercase().cmp(&right.name.to_ascii_lowercase()),
            ),
        };
        ordering.then_with(|| left.id.cmp(&right.id))
    });

    let limit = query.limit.unwrap_or(default_limit);
    let total = deals.len();
    let items = deals.into_iter().skip(query.offset).take(limit).cloned().collect();

    Page { items, total, offset: query.offset, limit }
}

/// Undated deals sort after dated ones in either direction.
fn compare_dates(
    left: &Opportunity,
    right: &Opportunity,
    directed: impl Fn(Ordering) -> Ordering,
) -> Ordering {
    match (left.expected_close_date, right.expected_close_date) {
        (Some(left), Some(right)) => directed(left.cmp(&right)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
