//! Billing period handling
//!
//! A bill covers exactly one calendar month of one year. This module provides
//! the `BillingPeriod` value type together with the calendar arithmetic the
//! debt reports rely on (ordering, next month, adjacency across year ends).

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Timezone wrapper for the property's jurisdiction
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Tz::from_str(&s)
            .map(Timezone)
            .map_err(|_| serde::de::Error::custom(format!("Invalid timezone: {}", s)))
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Parses an IANA timezone name such as `Asia/Ho_Chi_Minh`
    pub fn parse(name: &str) -> Result<Self, PeriodError> {
        Tz::from_str(name)
            .map(Timezone)
            .map_err(|_| PeriodError::InvalidTimezone(name.to_string()))
    }

    /// Returns the IANA name
    pub fn name(&self) -> &'static str {
        self.0.name()
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::Asia::Ho_Chi_Minh)
    }
}

/// Errors related to billing periods
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Invalid month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("Invalid year {0}")]
    InvalidYear(i32),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),
}

/// The calendar month a bill belongs to
///
/// Periods order by `(year, month)`. At most one bill exists per room and
/// period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct BillingPeriod {
    month: u32,
    year: i32,
}

/// Unvalidated wire form of a period
#[derive(Deserialize)]
struct RawPeriod {
    month: u32,
    year: i32,
}

impl TryFrom<RawPeriod> for BillingPeriod {
    type Error = PeriodError;

    fn try_from(raw: RawPeriod) -> Result<Self, Self::Error> {
        BillingPeriod::new(raw.month, raw.year)
    }
}

impl BillingPeriod {
    /// Creates a period, validating the month range
    ///
    /// # Arguments
    ///
    /// * `month` - Calendar month, 1 through 12
    /// * `year` - Calendar year (1900-9999)
    pub fn new(month: u32, year: i32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError::InvalidMonth(month));
        }
        if !(1900..=9999).contains(&year) {
            return Err(PeriodError::InvalidYear(year));
        }
        Ok(Self { month, year })
    }

    /// Returns the period containing the given instant in the given timezone
    pub fn containing(instant: DateTime<Utc>, tz: Timezone) -> Self {
        let local = instant.with_timezone(&tz.0);
        Self {
            month: local.month(),
            year: local.year(),
        }
    }

    /// Returns the current period in the given timezone
    pub fn current(tz: Timezone) -> Self {
        Self::containing(Utc::now(), tz)
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Returns the following calendar month
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { month: 1, year: self.year + 1 }
        } else {
            Self { month: self.month + 1, year: self.year }
        }
    }

    /// Returns the preceding calendar month
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self { month: 12, year: self.year - 1 }
        } else {
            Self { month: self.month - 1, year: self.year }
        }
    }

    /// Returns true if `other` is the calendar month directly after `self`
    pub fn is_followed_by(&self, other: &BillingPeriod) -> bool {
        self.next() == *other
    }

    /// Months elapsed since year zero, used for distance calculations
    pub fn ordinal(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }
}

impl PartialOrd for BillingPeriod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BillingPeriod {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.year, self.month).cmp(&(other.year, other.month))
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}
