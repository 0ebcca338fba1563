//! Turning raw tab-delimited API responses into flat CSV tables.

pub mod demography;
pub mod stats;
pub mod table_writer;

pub use demography::{classify_section, split_sections, DemographyTable};
pub use stats::StatsWriter;
pub use table_writer::{FinishedTable, TableWriter};

use crate::error::Result;
use crate::period::Period;

pub const PERIOD_COLUMNS: [&str; 3] = ["begin_period", "end_period", "period_type"];

/// Output column names may not contain `%`.
pub fn clean_header(cell: &str) -> String {
    cell.trim().replace('%', "prc")
}

/// Parses tab-delimited text into rows of cells. Blank lines are dropped.
pub fn parse_tsv(raw: &str) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quote(b'"')
        .has_headers(false)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Where a response came from: appended to every row written from it.
#[derive(Debug, Clone, Copy)]
pub struct Provenance<'a> {
    pub country: &'a str,
    pub period: &'a Period,
}

impl<'a> Provenance<'a> {
    pub fn new(country: &'a str, period: &'a Period) -> Self {
        Self { country, period }
    }

    pub fn header() -> Vec<String> {
        std::iter::once("country")
            .chain(PERIOD_COLUMNS)
            .map(str::to_string)
            .collect()
    }

    pub fn values(&self) -> Vec<String> {
        std::iter::once(self.country.to_string())
            .chain(self.period.provenance())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::PeriodType;
    use chrono::NaiveDate;

    #[test]
    fn test_clean_header() {
        assert_eq!(clean_header("reach %"), "reach prc");
        assert_eq!(clean_header("%ru"), "prcru");
        assert_eq!(clean_header("name"), "name");
    }

    #[test]
    fn test_parse_tsv_quotes_and_blank_lines() {
        let rows = parse_tsv("id\tname\r\n1\t\"Warsaw\tcentre\"\r\n\r\n2\tKrakow\r\n").unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["id".to_string(), "name".to_string()],
                vec!["1".to_string(), "Warsaw\tcentre".to_string()],
                vec!["2".to_string(), "Krakow".to_string()],
            ]
        );
    }

    #[test]
    fn test_parse_tsv_empty() {
        assert!(parse_tsv("").unwrap().is_empty());
    }

    #[test]
    fn test_provenance_columns() {
        let day = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let period = Period::new(day, day, PeriodType::Daily);
        let provenance = Provenance::new("US", &period);

        assert_eq!(
            Provenance::header(),
            vec!["country", "begin_period", "end_period", "period_type"]
        );
        assert_eq!(
            provenance.values(),
            vec!["US", "2023-01-02", "2023-01-02", "daily"]
        );
    }
}
