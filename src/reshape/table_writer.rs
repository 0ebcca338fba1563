use crate::error::Result;
use crate::reshape::{clean_header, parse_tsv, Provenance};
use csv::{QuoteStyle, Writer, WriterBuilder};
use std::fs::{self, File};
use std::path::PathBuf;
use tracing::debug;

/// A table that survived extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedTable {
    pub path: PathBuf,
    pub rows: usize,
}

/// Owns one output CSV file.
///
/// The file is created on first write, the header goes in at most once, and a table
/// that never received a data row is deleted by [`TableWriter::finish`].
pub struct TableWriter {
    path: PathBuf,
    writer: Option<Writer<File>>,
    header_written: bool,
    rows_written: usize,
}

impl TableWriter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            writer: None,
            header_written: false,
            rows_written: 0,
        }
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn has_header(&self) -> bool {
        self.header_written
    }

    /// Writes `header` unless a header is already in the file.
    pub fn write_header(&mut self, header: &[String]) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.write_record(header)?;
        self.header_written = true;
        Ok(())
    }

    pub fn write_row(&mut self, row: &[String]) -> Result<()> {
        self.write_record(row)?;
        self.rows_written += 1;
        Ok(())
    }

    /// Appends one uniform response: its first row is the header, the rest are data
    /// rows which get the provenance columns appended.
    pub fn append_standard(&mut self, raw: &str, provenance: &Provenance<'_>) -> Result<usize> {
        let mut rows = parse_tsv(raw)?.into_iter();
        let header = match rows.next() {
            Some(header) => header,
            None => return Ok(0),
        };

        if !self.header_written {
            let mut cleaned: Vec<String> = header.iter().map(|cell| clean_header(cell)).collect();
            cleaned.extend(Provenance::header());
            self.write_header(&cleaned)?;
        }

        let extra = provenance.values();
        let mut written = 0;
        for mut row in rows {
            row.extend(extra.iter().cloned());
            self.write_row(&row)?;
            written += 1;
        }
        Ok(written)
    }

    /// Flushes the file; deletes it if it holds no data rows.
    pub fn finish(mut self) -> Result<Option<FinishedTable>> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        if self.rows_written == 0 {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            debug!(path = %self.path.display(), "removed empty table");
            return Ok(None);
        }

        Ok(Some(FinishedTable {
            path: self.path,
            rows: self.rows_written,
        }))
    }

    fn write_record(&mut self, record: &[String]) -> Result<()> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            // Vendor rows may be shorter than the header or gain columns between periods.
            None => WriterBuilder::new()
                .flexible(true)
                .delimiter(b',')
                .quote(b'"')
                .quote_style(QuoteStyle::Necessary)
                .from_path(&self.path)?,
        };
        let writer = self.writer.insert(writer);
        writer.write_record(record)?;
        Ok(())
    }
}
