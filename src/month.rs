//! Calendar-month keys for the monthly panel.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable month value '{0}'")]
pub struct MonthParseError(pub String);

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return None;
        }
        Some(Self { year, month })
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    /// Months since year 0, used for calendar distance.
    pub fn ordinal(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    pub fn months_until(self, later: YearMonth) -> i64 {
        later.ordinal() - self.ordinal()
    }

    pub fn add_months(self, months: i64) -> Option<Self> {
        let ordinal = self.ordinal().checked_add(months)?;
        let year = i32::try_from(ordinal.div_euclid(12)).ok()?;
        let month = u32::try_from(ordinal.rem_euclid(12) + 1).ok()?;
        Self::new(year, month)
    }

    /// Accepts `YYYY-MM`, `YYYY-MM-DD`, `YYYY/MM`, `YYYYMM` and `Mon-YYYY`.
    pub fn parse(raw: &str) -> Result<Self, MonthParseError> {
        let trimmed = raw.trim();
        parse_calendar_date(trimmed)
            .and_then(|date| Self::new(date.year(), date.month()))
            .ok_or_else(|| MonthParseError(raw.to_string()))
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = MonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    if value.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{value}/01"), "%Y/%m/%d") {
        return Some(date);
    }
    if value.len() == 6 && value.bytes().all(|b| b.is_ascii_digit()) {
        let year = value[..4].parse::<i32>().ok()?;
        let month = value[4..].parse::<u32>().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1);
    }
    NaiveDate::parse_from_str(&format!("01-{value}"), "%d-%b-%Y").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn parses_supported_formats_to_the_same_month() {
        for raw in ["2016-07", "2016-07-15", "2016/07", "201607", "Jul-2016", " 2016-07 "] {
            assert_eq!(YearMonth::parse(raw).unwrap(), ym(2016, 7), "raw={raw}");
        }
    }

    #[test]
    fn rejects_malformed_months_with_the_raw_value() {
        for raw in ["", "2016-13", "July", "201613", "2016-07-32"] {
            let err = YearMonth::parse(raw).unwrap_err();
            assert_eq!(err.0, raw);
        }
    }

    #[test]
    fn ordering_and_calendar_arithmetic_cross_year_boundaries() {
        assert!(ym(2023, 12) < ym(2024, 1));
        assert_eq!(ym(2023, 11).months_until(ym(2024, 2)), 3);
        assert_eq!(ym(2023, 11).add_months(3), Some(ym(2024, 2)));
        assert_eq!(ym(2024, 1).add_months(-1), Some(ym(2023, 12)));
        assert_eq!(ym(2024, 3).to_string(), "2024-03");
    }
}
