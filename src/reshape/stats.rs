use crate::error::Result;
use crate::period::Period;
use crate::reshape::{clean_header, parse_tsv, FinishedTable, TableWriter, PERIOD_COLUMNS};
use std::collections::HashMap;
use std::path::PathBuf;

pub const STATS_BASE_COLUMNS: [&str; 4] = ["geo_id", "node_id", "platform_id", "target_group"];
pub const STATS_APPEND_COLUMNS: [&str; 2] = ["country", "filter"];

/// Stats table with a column set fixed at creation.
///
/// Response columns are matched by name: unknown ones are dropped and expected ones
/// missing from a response stay blank.
pub struct StatsWriter {
    table: TableWriter,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    filter: String,
}

impl StatsWriter {
    /// `metrics` are the metric column names as the API reports them; `filter` is the
    /// serialized filter set written into every row.
    pub fn new<P: Into<PathBuf>>(path: P, metrics: &[String], filter: String) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let candidates = metrics
            .iter()
            .map(|m| clean_header(m))
            .chain(STATS_APPEND_COLUMNS.iter().map(|c| c.to_string()))
            .chain(STATS_BASE_COLUMNS.iter().map(|c| c.to_string()))
            .chain(PERIOD_COLUMNS.iter().map(|c| c.to_string()));
        for column in candidates {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }

        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();

        Self {
            table: TableWriter::new(path),
            columns,
            index,
            filter,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows_written(&self) -> usize {
        self.table.rows_written()
    }

    pub fn append(&mut self, raw: &str, country: &str, period: &Period) -> Result<usize> {
        let mut rows = parse_tsv(raw)?.into_iter();
        let header = match rows.next() {
            Some(header) => header,
            None => return Ok(0),
        };

        let positions: Vec<Option<usize>> = header
            .iter()
            .map(|cell| self.index.get(&clean_header(cell)).copied())
            .collect();

        if !self.table.has_header() {
            self.table.write_header(&self.columns)?;
        }

        let [begin, end, period_type] = period.provenance();
        let provenance = [
            ("country", country.to_string()),
            ("filter", self.filter.clone()),
            ("begin_period", begin),
            ("end_period", end),
            ("period_type", period_type),
        ];

        let mut written = 0;
        for row in rows {
            let mut out = vec![String::new(); self.columns.len()];
            for (value, position) in row.into_iter().zip(&positions) {
                if let Some(col) = position {
                    out[*col] = value;
                }
            }
            for (name, value) in &provenance {
                if let Some(&col) = self.index.get(*name) {
                    out[col] = value.clone();
                }
            }
            self.table.write_row(&out)?;
            written += 1;
        }
        Ok(written)
    }

    pub fn finish(self) -> Result<Option<FinishedTable>> {
        self.table.finish()
    }
}
