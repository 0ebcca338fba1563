use crate::client::VendorApi;
use crate::error::{ExtractorError, Result};
use crate::period::{Interval, Period, PeriodSet, PeriodType};
use crate::reshape::parse_tsv;
use chrono::NaiveDate;
use tracing::{debug, warn};

const COL_BEGIN: &str = "begin";
const COL_END: &str = "end";
const COL_PERIOD_TYPE: &str = "period type";
const COL_COUNTRY: &str = "country";

/// One row of the available-periods listing.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailablePeriod {
    pub country: String,
    pub begin: NaiveDate,
    pub end: NaiveDate,
    /// `None` for period types this tool does not know.
    pub period_type: Option<PeriodType>,
}

pub struct PeriodResolver<'a, A: VendorApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: VendorApi + ?Sized> PeriodResolver<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Periods per country whose begin lies in `interval` and whose type is `period_type`.
    ///
    /// The vendor's own period type filter is unreliable, so the full listing is
    /// fetched and filtered here. An empty `countries` slice means all countries.
    pub fn resolve(&self, interval: Interval, period_type: PeriodType, countries: &[String]) -> Result<PeriodSet> {
        let listing = self.api.available_periods()?;
        let rows = parse_available_periods(&listing)?;
        debug!(rows = rows.len(), "fetched available periods");
        Ok(select_periods(&rows, interval, period_type, countries))
    }
}

/// Parses the tab-delimited available-periods listing. Rows with unreadable dates are skipped.
pub fn parse_available_periods(listing: &str) -> Result<Vec<AvailablePeriod>> {
    let table = parse_tsv(listing)?;
    let mut rows = table.into_iter();

    let header = match rows.next() {
        Some(header) => header,
        None => return Ok(Vec::new()),
    };
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| ExtractorError::InvalidResponse {
                message: format!("available-periods listing has no '{}' column", name),
            })
    };
    let (begin_idx, end_idx, type_idx, country_idx) = (
        column(COL_BEGIN)?,
        column(COL_END)?,
        column(COL_PERIOD_TYPE)?,
        column(COL_COUNTRY)?,
    );

    let mut periods = Vec::new();
    for row in rows {
        let field = |idx: usize| row.get(idx).map(|s| s.trim()).unwrap_or("");
        let country = field(country_idx);
        let (begin, end) = match (parse_listing_date(field(begin_idx)), parse_listing_date(field(end_idx))) {
            (Some(begin), Some(end)) if !country.is_empty() => (begin, end),
            _ => {
                warn!(?row, "skipping malformed available-periods row");
                continue;
            }
        };

        periods.push(AvailablePeriod {
            country: country.to_string(),
            begin,
            end,
            period_type: field(type_idx).parse().ok(),
        });
    }

    Ok(periods)
}

/// Groups listing rows by country, keeping only matching periods.
///
/// Every country seen in the listing (after the country restriction) is present in
/// the result, even when nothing inside the interval matches.
pub fn select_periods(
    rows: &[AvailablePeriod],
    interval: Interval,
    period_type: PeriodType,
    countries: &[String],
) -> PeriodSet {
    let mut set = PeriodSet::new();

    for row in rows {
        if !countries.is_empty() && !countries.iter().any(|c| c == &row.country) {
            continue;
        }

        let periods = set.insert_country(row.country.as_str());
        if row.period_type == Some(period_type) && interval.contains(row.begin) {
            periods.push(Period::new(row.begin, row.end, period_type));
        }
    }

    set
}

/// Accepts `2023-01-01` as well as timestamps like `2023-01-01 00:00:00`.
fn parse_listing_date(value: &str) -> Option<NaiveDate> {
    let date_part = value.split(|c| c == ' ' || c == 'T').next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
