use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Calendar month a pipeline snapshot was taken in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReportingMonth {
    pub year: i32,
    pub month: u32,
}

impl ReportingMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Accepts `YYYY-MM`, `YYYY-MM-DD`, or any full date/datetime that
    /// [`parse_calendar_date`] understands.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some((year, month)) = trimmed.split_once('-') {
            if !month.contains('-') {
                let year = year.parse::<i32>().ok()?;
                let month = month.parse::<u32>().ok()?;
                return Self::new(year, month);
            }
        }

        parse_calendar_date(trimmed).map(Self::from_date)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self { year: date.year(), month: date.month() }
    }

    pub fn quarter(&self) -> u32 {
        quarter_of(self.month)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// Shifts the month back by `months` calendar months. `None` when the
    /// result falls outside the representable year range.
    pub fn months_before(&self, months: u32) -> Option<Self> {
        let shift = i64::from(months);
        let index = i64::from(self.year) * 12 + i64::from(self.month) - 1 - shift;
        let year = i32::try_from(index.div_euclid(12)).ok()?;
        let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
        Self::new(year, month)
    }
}

impl fmt::Display for ReportingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Parses a record date as a local calendar date. Time components and
/// offsets are dropped rather than converted so a deal closing late on
/// Dec 31 stays in December.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime.date());
        }
    }

    // RFC 3339 with an offset: keep the wall-clock date as written.
    trimmed.get(..10).and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

pub fn parse_optional_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(parse_calendar_date)
}

pub fn quarter_of(month: u32) -> u32 {
    month.saturating_add(2) / 3
}
