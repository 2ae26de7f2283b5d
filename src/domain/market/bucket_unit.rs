use crate::domain::errors::OhlcvError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Calendar unit a candle bucket is measured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl BucketUnit {
    /// Canonical short name, as used in channel keys
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketUnit::Second => "sec",
            BucketUnit::Minute => "min",
            BucketUnit::Hour => "hour",
            BucketUnit::Day => "day",
            BucketUnit::Week => "week",
            BucketUnit::Month => "month",
            BucketUnit::Year => "year",
        }
    }

    /// Returns all units in ascending order of length
    pub fn all() -> Vec<BucketUnit> {
        vec![
            BucketUnit::Second,
            BucketUnit::Minute,
            BucketUnit::Hour,
            BucketUnit::Day,
            BucketUnit::Week,
            BucketUnit::Month,
            BucketUnit::Year,
        ]
    }

    /// Whether one unit always spans the same number of seconds
    pub fn is_fixed_length(&self) -> bool {
        !matches!(self, BucketUnit::Month | BucketUnit::Year)
    }

    /// Length of one unit in seconds.
    ///
    /// Months and years vary in length, so the month or year containing
    /// `reference` is used. That value is only an approximation for sizing
    /// "latest bucket" windows, never for bucket membership.
    pub fn unit_seconds(&self, reference: DateTime<Utc>) -> i64 {
        match self {
            BucketUnit::Second => 1,
            BucketUnit::Minute => 60,
            BucketUnit::Hour => 60 * 60,
            BucketUnit::Day => SECONDS_PER_DAY,
            BucketUnit::Week => 7 * SECONDS_PER_DAY,
            BucketUnit::Month => days_in_month(reference.year(), reference.month()) * SECONDS_PER_DAY,
            BucketUnit::Year => days_in_year(reference.year()) * SECONDS_PER_DAY,
        }
    }
}

fn days_in_month(year: i32, month: u32) -> i64 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };

    match (first, next) {
        (Some(first), Some(next)) => (next - first).num_days(),
        _ => 30,
    }
}

fn days_in_year(year: i32) -> i64 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}

impl FromStr for BucketUnit {
    type Err = OhlcvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Ok(BucketUnit::Second),
            "min" | "minute" | "minutes" => Ok(BucketUnit::Minute),
            "h" | "hour" | "hours" => Ok(BucketUnit::Hour),
            "d" | "day" | "days" => Ok(BucketUnit::Day),
            "w" | "week" | "weeks" => Ok(BucketUnit::Week),
            "month" | "months" => Ok(BucketUnit::Month),
            "y" | "yr" | "year" | "years" => Ok(BucketUnit::Year),
            _ => Err(OhlcvError::InvalidUnit {
                unit: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for BucketUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_str() {
        assert_eq!(BucketUnit::from_str("sec").unwrap(), BucketUnit::Second);
        assert_eq!(BucketUnit::from_str("MIN").unwrap(), BucketUnit::Minute);
        assert_eq!(BucketUnit::from_str("hour").unwrap(), BucketUnit::Hour);
        assert_eq!(BucketUnit::from_str("week").unwrap(), BucketUnit::Week);
        assert_eq!(BucketUnit::from_str("month").unwrap(), BucketUnit::Month);
        assert_eq!(BucketUnit::from_str("yr").unwrap(), BucketUnit::Year);

        let err = BucketUnit::from_str("fortnight").unwrap_err();
        assert!(matches!(err, OhlcvError::InvalidUnit { ref unit } if unit == "fortnight"));
    }

    #[test]
    fn test_display_matches_canonical_name() {
        for unit in BucketUnit::all() {
            assert_eq!(BucketUnit::from_str(&unit.to_string()).unwrap(), unit);
        }
    }

    #[test]
    fn test_fixed_unit_seconds() {
        let reference = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(BucketUnit::Second.unit_seconds(reference), 1);
        assert_eq!(BucketUnit::Minute.unit_seconds(reference), 60);
        assert_eq!(BucketUnit::Hour.unit_seconds(reference), 3600);
        assert_eq!(BucketUnit::Day.unit_seconds(reference), 86400);
        assert_eq!(BucketUnit::Week.unit_seconds(reference), 604800);
    }

    #[test]
    fn test_calendar_unit_seconds_follow_reference() {
        let leap_feb = Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap();
        let plain_feb = Utc.with_ymd_and_hms(2023, 2, 10, 0, 0, 0).unwrap();
        let december = Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap();

        assert_eq!(BucketUnit::Month.unit_seconds(leap_feb), 29 * 86400);
        assert_eq!(BucketUnit::Month.unit_seconds(plain_feb), 28 * 86400);
        assert_eq!(BucketUnit::Month.unit_seconds(december), 31 * 86400);
        assert_eq!(BucketUnit::Year.unit_seconds(leap_feb), 366 * 86400);
        assert_eq!(BucketUnit::Year.unit_seconds(plain_feb), 365 * 86400);
        assert!(!BucketUnit::Month.is_fixed_length());
        assert!(BucketUnit::Week.is_fixed_length());
    }
}
