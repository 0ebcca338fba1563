pub mod resolver;

pub use resolver::{parse_available_periods, PeriodResolver};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Granularity of a vendor period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Daily => "daily",
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
            PeriodType::Yearly => "yearly",
        }
    }
}

impl Default for PeriodType {
    fn default() -> Self {
        PeriodType::Daily
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(PeriodType::Daily),
            "weekly" => Ok(PeriodType::Weekly),
            "monthly" => Ok(PeriodType::Monthly),
            "quarterly" => Ok(PeriodType::Quarterly),
            "yearly" => Ok(PeriodType::Yearly),
            other => Err(format!("unknown period type '{}'", other)),
        }
    }
}

/// A discrete date range the vendor offers data for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Period {
    pub begin: NaiveDate,
    pub end: NaiveDate,
    pub period_type: PeriodType,
}

impl Period {
    pub fn new(begin: NaiveDate, end: NaiveDate, period_type: PeriodType) -> Self {
        Self {
            begin,
            end,
            period_type,
        }
    }

    /// Values for the `begin_period`, `end_period`, `period_type` columns.
    pub fn provenance(&self) -> [String; 3] {
        [
            self.begin.format("%Y-%m-%d").to_string(),
            self.end.format("%Y-%m-%d").to_string(),
            self.period_type.to_string(),
        ]
    }
}

/// Requested date interval, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub begin: NaiveDate,
    pub end: NaiveDate,
}

impl Interval {
    pub fn new(begin: NaiveDate, end: NaiveDate) -> Self {
        Self { begin, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.begin && date < self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.begin, self.end)
    }
}

/// Periods per country for one interval and granularity.
///
/// A country may map to an empty sequence: it is known to the vendor but has no
/// matching period in the interval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodSet {
    countries: BTreeMap<String, Vec<Period>>,
}

impl PeriodSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_country<S: Into<String>>(&mut self, country: S) -> &mut Vec<Period> {
        self.countries.entry(country.into()).or_default()
    }

    pub fn push(&mut self, country: &str, period: Period) {
        self.insert_country(country).push(period);
    }

    pub fn countries(&self) -> impl Iterator<Item = &str> {
        self.countries.keys().map(String::as_str)
    }

    pub fn periods(&self, country: &str) -> &[Period] {
        self.countries
            .get(country)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Period])> {
        self.countries
            .iter()
            .map(|(country, periods)| (country.as_str(), periods.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    pub fn empty_countries(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, periods)| periods.is_empty())
            .map(|(country, _)| country)
            .collect()
    }

    /// True when there is nothing to download at all.
    pub fn has_no_periods(&self) -> bool {
        self.countries.values().all(Vec::is_empty)
    }

    pub fn total_periods(&self) -> usize {
        self.countries.values().map(Vec::len).sum()
    }

    /// Periods with distinct `(begin, end)` bounds across all countries, first seen first.
    pub fn distinct_periods(&self) -> Vec<&Period> {
        let mut seen = HashSet::new();
        self.countries
            .values()
            .flatten()
            .filter(|period| seen.insert((period.begin, period.end)))
            .collect()
    }
}
