//! Bucket boundary computation.
//!
//! Buckets are calendar aligned: a bucket is a run of `duration` consecutive
//! values of the unit's natural calendar field (second-of-minute,
//! minute-of-hour, hour-of-day, day-of-month, ISO week of the ISO week-year,
//! month-of-year), restarting at every enclosing period. Zero-based fields
//! (seconds, minutes, hours) align to multiples of `duration`; one-based fields
//! (days, ISO weeks, months) align to `1, 1 + duration, 1 + 2 * duration, ...`.
//! Years align to multiples of `duration`.
//!
//! Week buckets follow ISO week-year numbering (weeks start on Monday, week 1
//! holds the year's first Thursday), so 2021-01-01 belongs to week 53 of 2020.

use crate::domain::errors::OhlcvError;
use crate::domain::market::bucket_unit::BucketUnit;
use crate::domain::trading::types::{Pair, Trade};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bucket size: `duration` consecutive `unit`s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketSpec {
    pub duration: u32,
    pub unit: BucketUnit,
}

/// Discrete calendar identity of a bucket.
///
/// For months and years the width in seconds is not constant, so buckets are
/// identified by their calendar group rather than by a fixed stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketLabel {
    /// Second through day buckets, identified by their start instant
    Instant(DateTime<Utc>),
    IsoWeek { year: i32, week: u32 },
    Month { year: i32, month: u32 },
    Year { year: i32 },
}

/// Result of aligning a reference timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketBoundary {
    /// Start of the bucket containing the reference, at or before it
    pub start: DateTime<Utc>,
    /// `duration * unit length`; for months and years the length of the
    /// reference's own month or year is used
    pub width_seconds: i64,
    pub label: BucketLabel,
}

impl BucketSpec {
    pub fn new(duration: i64, unit: BucketUnit) -> Result<Self, OhlcvError> {
        let duration = u32::try_from(duration)
            .ok()
            .filter(|d| *d >= 1)
            .ok_or(OhlcvError::InvalidDuration { duration })?;

        Ok(Self { duration, unit })
    }

    /// Build a spec from an unparsed unit name
    pub fn parse(duration: i64, unit: &str) -> Result<Self, OhlcvError> {
        let unit = BucketUnit::from_str(unit)?;
        Self::new(duration, unit)
    }

    /// Bucket width in seconds around `reference`
    pub fn width_seconds(&self, reference: DateTime<Utc>) -> i64 {
        i64::from(self.duration) * self.unit.unit_seconds(reference)
    }

    /// Aligned start of the bucket containing `reference`
    pub fn bucket_start(&self, reference: DateTime<Utc>) -> Result<DateTime<Utc>, OhlcvError> {
        self.align(reference).map(|boundary| boundary.start)
    }

    /// Compute the bucket containing `reference`
    pub fn align(&self, reference: DateTime<Utc>) -> Result<BucketBoundary, OhlcvError> {
        let d = self.duration;
        let date = reference.date_naive();

        let (start, label) = match self.unit {
            BucketUnit::Second => {
                let start = date.and_hms_opt(
                    reference.hour(),
                    reference.minute(),
                    floor_zero_based(reference.second(), d),
                );
                (start, None)
            }
            BucketUnit::Minute => {
                let start =
                    date.and_hms_opt(reference.hour(), floor_zero_based(reference.minute(), d), 0);
                (start, None)
            }
            BucketUnit::Hour => {
                let start = date.and_hms_opt(floor_zero_based(reference.hour(), d), 0, 0);
                (start, None)
            }
            BucketUnit::Day => {
                let day = floor_one_based(date.day(), d);
                (midnight(NaiveDate::from_ymd_opt(date.year(), date.month(), day)), None)
            }
            BucketUnit::Week => {
                let iso = date.iso_week();
                let week = floor_one_based(iso.week(), d);
                let monday = NaiveDate::from_isoywd_opt(iso.year(), week, Weekday::Mon);
                let label = BucketLabel::IsoWeek {
                    year: iso.year(),
                    week,
                };
                (midnight(monday), Some(label))
            }
            BucketUnit::Month => {
                let month = floor_one_based(date.month(), d);
                let label = BucketLabel::Month {
                    year: date.year(),
                    month,
                };
                (midnight(NaiveDate::from_ymd_opt(date.year(), month, 1)), Some(label))
            }
            BucketUnit::Year => {
                let year = date.year() - date.year().rem_euclid(d as i32);
                let label = BucketLabel::Year { year };
                (midnight(NaiveDate::from_ymd_opt(year, 1, 1)), Some(label))
            }
        };

        let start = start
            .ok_or_else(|| OhlcvError::InvalidTimestamp {
                reason: format!("cannot align {} to {}", reference, self),
            })?
            .and_utc();

        Ok(BucketBoundary {
            start,
            width_seconds: self.width_seconds(reference),
            label: label.unwrap_or(BucketLabel::Instant(start)),
        })
    }
}

/// Align `reference` to its bucket for `duration` units of `unit`
pub fn align(
    reference: DateTime<Utc>,
    duration: i64,
    unit: &str,
) -> Result<BucketBoundary, OhlcvError> {
    BucketSpec::parse(duration, unit)?.align(reference)
}

fn floor_zero_based(value: u32, duration: u32) -> u32 {
    value - value % duration
}

fn floor_one_based(value: u32, duration: u32) -> u32 {
    value - (value - 1) % duration
}

fn midnight(date: Option<NaiveDate>) -> Option<NaiveDateTime> {
    date.and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl fmt::Display for BucketSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.duration, self.unit)
    }
}

/// Identity of one candle: two trades share a key iff they have the same pair
/// and fall in the same aligned bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub pair: Pair,
    pub spec: BucketSpec,
    pub start: DateTime<Utc>,
}

impl BucketKey {
    pub fn for_trade(trade: &Trade, spec: BucketSpec) -> Result<Self, OhlcvError> {
        Ok(Self {
            pair: trade.pair.clone(),
            spec,
            start: spec.bucket_start(trade.created_at)?,
        })
    }
}
