use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::calendar::quarter_of;
use crate::domain::opportunity::{LogoType, Opportunity, RevenueType};
use crate::errors::DomainError;

/// Attributes a filter can be evaluated against. Implemented by
/// opportunities and by the resolved views of raw snapshot rows so one
/// evaluator serves every aggregator.
pub trait DealAttributes {
    fn region(&self) -> &str;
    fn vertical(&self) -> &str;
    fn segment(&self) -> &str;
    fn logo_type(&self) -> LogoType;
    fn sold_by(&self) -> &str;
    fn product_category(&self) -> Option<&str>;
    fn product_sub_category(&self) -> Option<&str>;
    fn close_date(&self) -> Option<NaiveDate>;
}

impl DealAttributes for Opportunity {
    fn region(&self) -> &str {
        &self.region
    }

    fn vertical(&self) -> &str {
        &self.vertical
    }

    fn segment(&self) -> &str {
        &self.segment
    }

    fn logo_type(&self) -> LogoType {
        self.logo_type
    }

    fn sold_by(&self) -> &str {
        &self.sold_by
    }

    fn product_category(&self) -> Option<&str> {
        self.product_category.as_deref()
    }

    fn product_sub_category(&self) -> Option<&str> {
        self.product_sub_category.as_deref()
    }

    fn close_date(&self) -> Option<NaiveDate> {
        self.expected_close_date
    }
}

/// Multi-dimensional report filter. An empty dimension matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub years: Vec<i32>,
    pub quarters: Vec<u32>,
    pub months: Vec<u32>,
    pub regions: Vec<String>,
    pub verticals: Vec<String>,
    pub segments: Vec<String>,
    pub logo_types: Vec<String>,
    pub product_categories: Vec<String>,
    pub product_sub_categories: Vec<String>,
    pub sold_by: Option<String>,
    pub revenue_type: Option<RevenueType>,
}

impl FilterSpec {
    pub fn revenue_type(&self) -> RevenueType {
        self.revenue_type.unwrap_or_default()
    }

    pub fn has_temporal_dimension(&self) -> bool {
        !self.years.is_empty() || !self.quarters.is_empty() || !self.months.is_empty()
    }

    /// Rejects selections that can never match a calendar date.
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(quarter) = self.quarters.iter().find(|quarter| !(1..=4).contains(*quarter)) {
            return Err(DomainError::InvalidFilter(format!(
                "quarter {quarter} is outside 1..=4"
            )));
        }
        if let Some(month) = self.months.iter().find(|month| !(1..=12).contains(*month)) {
            return Err(DomainError::InvalidFilter(format!("month {month} is outside 1..=12")));
        }
        Ok(())
    }

    /// AND across every populated dimension.
    pub fn matches<T: DealAttributes + ?Sized>(&self, deal: &T) -> bool {
        self.matches_dimensions(deal) && self.matches_period(deal.close_date())
    }

    /// Every non-temporal dimension. Used where the period is chosen by
    /// other means, such as the movement engine's target month.
    pub fn matches_dimensions<T: DealAttributes + ?Sized>(&self, deal: &T) -> bool {
        matches_any(&self.regions, deal.region())
            && matches_any(&self.verticals, deal.vertical())
            && matches_any(&self.segments, deal.segment())
            && self.matches_logo_type(deal.logo_type())
            && matches_optional(&self.product_categories, deal.product_category())
            && matches_optional(&self.product_sub_categories, deal.product_sub_category())
            && self.matches_sold_by(deal.sold_by())
    }

    pub fn matches_period(&self, close_date: Option<NaiveDate>) -> bool {
        if !self.has_temporal_dimension() {
            return true;
        }
        let Some(date) = close_date else {
            return false;
        };

        (self.years.is_empty() || self.years.contains(&date.year()))
            && (self.quarters.is_empty() || self.quarters.contains(&quarter_of(date.month())))
            && (self.months.is_empty() || self.months.contains(&date.month()))
    }

    fn matches_logo_type(&self, logo_type: LogoType) -> bool {
        if self.logo_types.is_empty() {
            return true;
        }
        self.logo_types.iter().any(|selected| {
            let selected = selected.trim();
            if selected.eq_ignore_ascii_case(logo_type.label())
                || selected.eq_ignore_ascii_case(logo_type.bucket())
            {
                return true;
            }
            // A raw "Renewal" selection covers "Extension" deals and vice versa.
            LogoType::from_label(selected)
                .is_some_and(|parsed| parsed.bucket() == logo_type.bucket())
        })
    }

    fn matches_sold_by(&self, sold_by: &str) -> bool {
        match self.sold_by.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(selected) if selected.eq_ignore_ascii_case("all") => true,
            Some(selected) => selected.eq_ignore_ascii_case(sold_by.trim()),
        }
    }

    /// Same filter shifted one year back. With no year selected the
    /// comparison year is `current_year - 1`.
    pub fn previous_year(&self, current_year: i32) -> FilterSpec {
        let years = if self.years.is_empty() {
            vec![current_year - 1]
        } else {
            self.years.iter().map(|year| year - 1).collect()
        };
        FilterSpec { years, ..self.clone() }
    }

    /// Years the filter selects, or the current year when unset.
    pub fn selected_years(&self, current_year: i32) -> Vec<i32> {
        if self.years.is_empty() {
            vec![current_year]
        } else {
            let mut years = self.years.clone();
            years.sort_unstable();
            years.dedup();
            years
        }
    }

    /// Pins period-bound reports to the operating year when no year is
    /// selected, so current and prior-year figures cover comparable spans.
    pub fn anchored(&self, current_year: i32) -> FilterSpec {
        self.with_years(self.selected_years(current_year))
    }

    pub fn with_years(&self, years: Vec<i32>) -> FilterSpec {
        FilterSpec { years, ..self.clone() }
    }

    pub fn with_quarters(&self, quarters: Vec<u32>) -> FilterSpec {
        FilterSpec { quarters, ..self.clone() }
    }

    pub fn with_months(&self, months: Vec<u32>) -> FilterSpec {
        FilterSpec { months, ..self.clone() }
    }

    pub fn with_regions(&self, regions: Vec<String>) -> FilterSpec {
        FilterSpec { regions, ..self.clone() }
    }
}

fn matches_any(selected: &[String], candidate: &str) -> bool {
    selected.is_empty()
        || selected.iter().any(|value| value.trim().eq_ignore_ascii_case(candidate.trim()))
}

fn matches_optional(selected: &[String], candidate: Option<&str>) -> bool {
    if selected.is_empty() {
        return true;
    }
    candidate.is_some_and(|candidate| matches_any(selected, candidate))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::FilterSpec;
    use crate::analytics::test_support::opportunity;
    use crate::analytics::valuation::value;
    use crate::domain::opportunity::{LogoType, OpportunityStatus, RevenueType};

    #[test]
    fn unset_filter_matches_everything() {
        let deal = opportunity("D1", OpportunityStatus::Active, 100, 0, "2026-02-10");
        let undated = {
            let mut deal = deal.clone();
            deal.expected_close_date = None;
            deal
        };

        assert!(FilterSpec::default().matches(&deal));
        assert!(FilterSpec::default().matches(&undated));
    }

    #[test]
    fn year_filter_and_revenue_type_valuation() {
        let deal = opportunity("D1", OpportunityStatus::Won, 1_000, 500, "2026-06-30");
        let filter = FilterSpec {
            years: vec![2026],
            revenue_type: Some(RevenueType::License),
            ..FilterSpec::default()
        };

        assert!(filter.matches(&deal));
        assert_eq!(value(&deal, filter.revenue_type()), Decimal::from(1_000));
        assert!(!filter.with_years(vec![2025]).matches(&deal));
    }

    #[test]
    fn populated_dimensions_are_anded() {
        let mut deal = opportunity("D1", OpportunityStatus::Active, 100, 0, "2026-08-15");
        deal.region = "EMEA".to_owned();
        deal.vertical = "Banking".to_owned();

        let both = FilterSpec {
            regions: vec!["emea".to_owned()],
            verticals: vec!["Banking".to_owned(), "Insurance".to_owned()],
            quarters: vec![3],
            ..FilterSpec::default()
        };
        assert!(both.matches(&deal));

        let wrong_region = FilterSpec { regions: vec!["APAC".to_owned()], ..both.clone() };
        assert!(!wrong_region.matches(&deal));

        let wrong_quarter = both.with_quarters(vec![1, 2]);
        assert!(!wrong_quarter.matches(&deal));
    }

    #[test]
    fn temporal_dimension_excludes_undated_deals() {
        let mut deal = opportunity("D1", OpportunityStatus::Active, 100, 0, "2026-08-15");
        deal.expected_close_date = None;

        let filter = FilterSpec { months: vec![8], ..FilterSpec::default() };
        assert!(!filter.matches(&deal));
        assert!(filter.matches_dimensions(&deal));
    }

    #[test]
    fn logo_type_bucket_and_raw_labels_match_both_expansion_types() {
        let mut renewal = opportunity("D1", OpportunityStatus::Active, 100, 0, "2026-01-10");
        renewal.logo_type = LogoType::Renewal;
        let mut extension = renewal.clone();
        extension.logo_type = LogoType::Extension;
        let mut upsell = renewal.clone();
        upsell.logo_type = LogoType::Upsell;

        for selection in ["Extension/Renewal", "Renewal", "extension"] {
            let filter =
                FilterSpec { logo_types: vec![selection.to_owned()], ..FilterSpec::default() };
            assert!(filter.matches(&renewal), "{selection} should match renewal");
            assert!(filter.matches(&extension), "{selection} should match extension");
            assert!(!filter.matches(&upsell), "{selection} should not match upsell");
        }
    }

    #[test]
    fn category_filters_require_an_attribution() {
        let mut deal = opportunity("D1", OpportunityStatus::Active, 100, 0, "2026-01-10");
        let filter =
            FilterSpec { product_categories: vec!["Payments".to_owned()], ..FilterSpec::default() };
        assert!(!filter.matches(&deal));

        deal.product_category = Some("Payments".to_owned());
        assert!(filter.matches(&deal));
    }

    #[test]
    fn sold_by_all_is_unrestricted() {
        let mut deal = opportunity("D1", OpportunityStatus::Active, 100, 0, "2026-01-10");
        deal.sold_by = "Partner".to_owned();

        let all = FilterSpec { sold_by: Some("All".to_owned()), ..FilterSpec::default() };
        let direct = FilterSpec { sold_by: Some("Direct".to_owned()), ..FilterSpec::default() };
        assert!(all.matches(&deal));
        assert!(!direct.matches(&deal));
    }

    #[test]
    fn previous_year_shifts_only_years() {
        let filter = FilterSpec {
            years: vec![2026, 2025],
            quarters: vec![2],
            regions: vec!["EMEA".to_owned()],
            revenue_type: Some(RevenueType::Implementation),
            ..FilterSpec::default()
        };

        let previous = filter.previous_year(2030);
        assert_eq!(previous.years, vec![2025, 2024]);
        assert_eq!(previous.quarters, filter.quarters);
        assert_eq!(previous.regions, filter.regions);
        assert_eq!(previous.revenue_type, filter.revenue_type);

        assert_eq!(FilterSpec::default().previous_year(2026).years, vec![2025]);
    }

    #[test]
    fn anchored_fills_in_the_operating_year_only_when_unset() {
        assert_eq!(FilterSpec::default().anchored(2026).years, vec![2026]);

        let explicit = FilterSpec { years: vec![2024, 2023, 2024], ..FilterSpec::default() };
        assert_eq!(explicit.anchored(2026).years, vec![2023, 2024]);
    }

    #[test]
    fn validate_rejects_impossible_periods() {
        assert!(FilterSpec { quarters: vec![5], ..FilterSpec::default() }.validate().is_err());
        assert!(FilterSpec { months: vec![0], ..FilterSpec::default() }.validate().is_err());
        assert!(FilterSpec { months: vec![12], ..FilterSpec::default() }.validate().is_ok());
    }
}
