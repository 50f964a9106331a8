use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A calendar year-month, rendered as `YYYY-MM`.
///
/// Used as the checkpoint key, the sheet tab title and the report label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid month {0:?}, expected YYYY-MM")]
pub struct MonthParseError(pub String);

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        // Delegate range validation to chrono
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("validated at construction")
    }

    /// Every calendar date of the month, ascending.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.first_day()
            .iter_days()
            .take_while(|d| d.month() == self.month)
            .collect()
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = MonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| MonthParseError(s.to_string()))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(MonthParseError(s.to_string()));
        }
        let year: i32 = year.parse().map_err(|_| MonthParseError(s.to_string()))?;
        let month: u32 = month.parse().map_err(|_| MonthParseError(s.to_string()))?;
        Month::new(year, month).ok_or_else(|| MonthParseError(s.to_string()))
    }
}

impl TryFrom<String> for Month {
    type Error = MonthParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Month> for String {
    fn from(m: Month) -> Self {
        m.to_string()
    }
}

/// Inclusive date range, ascending. Empty when `start > end`.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut d = start;
    while d <= end {
        dates.push(d);
        d = match d.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => break,
        };
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_roundtrips_through_display_and_parse() {
        let m: Month = "2026-02".parse().unwrap();
        assert_eq!(m.year(), 2026);
        assert_eq!(m.month(), 2);
        assert_eq!(m.to_string(), "2026-02");
    }

    #[test]
    fn month_rejects_malformed_input() {
        assert!("2026".parse::<Month>().is_err());
        assert!("2026-13".parse::<Month>().is_err());
        assert!("26-02".parse::<Month>().is_err());
        assert!("2026-2".parse::<Month>().is_err());
        assert!("2026-02-15".parse::<Month>().is_err());
    }

    #[test]
    fn february_2026_has_28_days() {
        let m: Month = "2026-02".parse().unwrap();
        let days = m.days();
        assert_eq!(days.len(), 28);
        assert_eq!(days[0], NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert_eq!(days[27], NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    }

    #[test]
    fn leap_february_has_29_days() {
        let m: Month = "2028-02".parse().unwrap();
        assert_eq!(m.days().len(), 29);
    }

    #[test]
    fn date_range_is_inclusive_and_ordered() {
        let start = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 2, 5).unwrap();
        let range = date_range(start, end);
        assert_eq!(range.len(), 5);
        assert_eq!(range.first(), Some(&start));
        assert_eq!(range.last(), Some(&end));

        assert!(date_range(end, start).is_empty());
        assert_eq!(date_range(start, start), vec![start]);
    }
}
