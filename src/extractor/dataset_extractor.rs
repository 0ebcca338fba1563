use crate::client::VendorApi;
use crate::config::DatasetConfig;
use crate::dataset::{DatasetKind, FilterParam};
use crate::error::{ExtractorError, Result};
use crate::extractor::{build_filters, FilterSet, TableResolver};
use crate::period::{Period, PeriodSet};
use crate::reshape::{
    classify_section, parse_tsv, split_sections, DemographyTable, FinishedTable, Provenance, StatsWriter,
    TableWriter,
};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A non-empty table produced by a dataset request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputFile {
    pub path: PathBuf,
    pub dataset: DatasetKind,
    /// Destination table name: the dataset, or `demography_<sub-table>`.
    pub table: String,
    pub country: String,
    pub primary_key: Vec<String>,
    pub row_count: usize,
}

impl OutputFile {
    fn from_finished(finished: FinishedTable, dataset: DatasetKind, table: String, country: &str) -> Self {
        Self {
            path: finished.path,
            dataset,
            table,
            country: country.to_string(),
            primary_key: dataset.primary_key(),
            row_count: finished.rows,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionProgress {
    pub dataset: DatasetKind,
    pub requests_done: usize,
    pub total_requests: usize,
    pub rows_written: usize,
    pub current: Option<String>,
    pub start_time: Instant,
    pub warnings: Vec<String>,
}

impl ExtractionProgress {
    pub fn new(dataset: DatasetKind, total_requests: usize) -> Self {
        Self {
            dataset,
            requests_done: 0,
            total_requests,
            rows_written: 0,
            current: None,
            start_time: Instant::now(),
            warnings: Vec::new(),
        }
    }

    pub fn update_request(&mut self, country: &str, period: &Period, rows: usize) {
        self.requests_done += 1;
        self.rows_written += rows;
        self.current = Some(format!("{} {}", country, period.begin));
    }

    pub fn update_catalog_request(&mut self, period: &Period) {
        self.requests_done += 1;
        self.current = Some(format!("metrics {}", period.begin));
    }

    pub fn add_warning<S: Into<String>>(&mut self, warning: S) {
        let warning = warning.into();
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn percentage(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.requests_done as f64 / self.total_requests as f64) * 100.0
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

pub type ProgressCallback<'c> = Option<&'c dyn Fn(&ExtractionProgress)>;

/// API requests needed to extract `kind` over `periods`, metric catalog included.
pub fn planned_requests(kind: DatasetKind, periods: &PeriodSet) -> usize {
    let catalog = match kind {
        DatasetKind::Stats => periods.distinct_periods().len(),
        _ => 0,
    };
    periods.total_periods() + catalog
}

/// Downloads one dataset request over a resolved [`PeriodSet`] and writes its tables.
pub struct DatasetExtractor<'a, A: VendorApi + ?Sized, R: TableResolver + ?Sized> {
    api: &'a A,
    tables: &'a R,
    output_dir: PathBuf,
}

impl<'a, A: VendorApi + ?Sized, R: TableResolver + ?Sized> DatasetExtractor<'a, A, R> {
    pub fn new<P: Into<PathBuf>>(api: &'a A, tables: &'a R, output_dir: P) -> Self {
        Self {
            api,
            tables,
            output_dir: output_dir.into(),
        }
    }

    /// Extracts `request` and returns the non-empty files, in country order.
    ///
    /// `file_uid` keeps file names of repeated dataset types apart within one run.
    pub fn extract(
        &self,
        request: &DatasetConfig,
        periods: &PeriodSet,
        file_uid: usize,
        progress_callback: ProgressCallback<'_>,
    ) -> Result<(Vec<OutputFile>, ExtractionProgress)> {
        let kind = request.dataset_type;
        let mut progress = ExtractionProgress::new(kind, planned_requests(kind, periods));

        if periods.has_no_periods() {
            progress.add_warning(format!(
                "No {} periods available for dataset {}, skipping",
                request.period_type, kind
            ));
            return Ok((Vec::new(), progress));
        }
        let empty = periods.empty_countries();
        if !empty.is_empty() {
            progress.add_warning(format!(
                "Some countries contain no {} periods: {}",
                request.period_type,
                empty.join(", ")
            ));
        }

        fs::create_dir_all(&self.output_dir)?;
        info!(dataset = %kind, file_uid, requests = progress.total_requests, "extracting dataset");

        let files = match kind {
            DatasetKind::Stats => {
                let filters = build_filters(&request.filters, self.tables)?;
                self.extract_stats(periods, &filters, file_uid, &mut progress, progress_callback)?
            }
            DatasetKind::Demography => {
                self.extract_demography(periods, file_uid, &mut progress, progress_callback)?
            }
            _ => self.extract_standard(kind, periods, file_uid, &mut progress, progress_callback)?,
        };

        debug!(dataset = %kind, files = files.len(), rows = progress.rows_written, "dataset done");
        Ok((files, progress))
    }

    fn extract_standard(
        &self,
        kind: DatasetKind,
        periods: &PeriodSet,
        file_uid: usize,
        progress: &mut ExtractionProgress,
        progress_callback: ProgressCallback<'_>,
    ) -> Result<Vec<OutputFile>> {
        let mut files = Vec::new();

        for (country, country_periods) in periods.iter().filter(|(_, p)| !p.is_empty()) {
            let path = self
                .output_dir
                .join(format!("{}-{}{}.csv", kind, file_uid, country));
            let mut table = TableWriter::new(path);

            for period in country_periods {
                notify(progress, progress_callback);
                let raw = self.api.fetch_dataset(kind, period, country, &FilterSet::new())?;
                let rows = table.append_standard(&raw, &Provenance::new(country, period))?;
                progress.update_request(country, period, rows);
            }

            if let Some(finished) = table.finish()? {
                files.push(OutputFile::from_finished(finished, kind, kind.to_string(), country));
            }
        }

        notify(progress, progress_callback);
        Ok(files)
    }

    fn extract_stats(
        &self,
        periods: &PeriodSet,
        filters: &FilterSet,
        file_uid: usize,
        progress: &mut ExtractionProgress,
        progress_callback: ProgressCallback<'_>,
    ) -> Result<Vec<OutputFile>> {
        let metrics = self.resolve_metrics(periods, filters.get(FilterParam::Metric), progress, progress_callback)?;
        let filter_column = filters.describe();
        let mut files = Vec::new();

        for (country, country_periods) in periods.iter().filter(|(_, p)| !p.is_empty()) {
            let path = self
                .output_dir
                .join(format!("{}-{}-{}.csv", DatasetKind::Stats, file_uid, country));
            let mut writer = StatsWriter::new(path, &metrics, filter_column.clone());

            for period in country_periods {
                notify(progress, progress_callback);
                let raw = self.api.fetch_dataset(DatasetKind::Stats, period, country, filters)?;
                let rows = writer.append(&raw, country, period)?;
                progress.update_request(country, period, rows);
            }

            if let Some(finished) = writer.finish()? {
                files.push(OutputFile::from_finished(
                    finished,
                    DatasetKind::Stats,
                    DatasetKind::Stats.to_string(),
                    country,
                ));
            }
        }

        notify(progress, progress_callback);
        Ok(files)
    }

    /// Metric names available in `periods`, deduplicated by id in order of first appearance.
    ///
    /// With `metric_ids`, only those metrics are kept, in the order given; an id the
    /// vendor does not know is rejected.
    pub fn metric_catalog(&self, periods: &PeriodSet, metric_ids: Option<&[String]>) -> Result<Vec<String>> {
        let mut progress = ExtractionProgress::new(DatasetKind::Metrics, periods.distinct_periods().len());
        self.resolve_metrics(periods, metric_ids, &mut progress, None)
    }

    fn resolve_metrics(
        &self,
        periods: &PeriodSet,
        metric_ids: Option<&[String]>,
        progress: &mut ExtractionProgress,
        progress_callback: ProgressCallback<'_>,
    ) -> Result<Vec<String>> {
        let mut catalog: Vec<(String, String)> = Vec::new();

        for period in periods.distinct_periods() {
            notify(progress, progress_callback);
            let raw = self.api.fetch_metrics(period)?;
            for (id, name) in parse_metric_rows(&raw)? {
                if !catalog.iter().any(|(known, _)| known == &id) {
                    catalog.push((id, name));
                }
            }
            progress.update_catalog_request(period);
        }
        debug!(metrics = catalog.len(), "resolved metric catalog");

        let ids = match metric_ids {
            Some(ids) => ids,
            None => return Ok(catalog.into_iter().map(|(_, name)| name).collect()),
        };

        let unknown: Vec<&str> = ids
            .iter()
            .filter(|id| !catalog.iter().any(|(known, _)| known == *id))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(ExtractorError::InvalidFilter {
                filter: FilterParam::Metric.to_string(),
                message: format!("Some metric IDs are not valid: {}", unknown.join(", ")),
            });
        }

        Ok(ids
            .iter()
            .filter_map(|id| {
                catalog
                    .iter()
                    .find(|(known, _)| known == id)
                    .map(|(_, name)| name.clone())
            })
            .collect())
    }

    fn extract_demography(
        &self,
        periods: &PeriodSet,
        file_uid: usize,
        progress: &mut ExtractionProgress,
        progress_callback: ProgressCallback<'_>,
    ) -> Result<Vec<OutputFile>> {
        let kind = DatasetKind::Demography;
        let mut files = Vec::new();

        for (country, country_periods) in periods.iter().filter(|(_, p)| !p.is_empty()) {
            let mut writers: Vec<(DemographyTable, TableWriter)> = DemographyTable::RECOGNIZED
                .iter()
                .map(|sub| {
                    let path = self
                        .output_dir
                        .join(format!("{}-{}-{}-{}.csv", kind, sub, file_uid, country));
                    (*sub, TableWriter::new(path))
                })
                .collect();

            for period in country_periods {
                notify(progress, progress_callback);
                let raw = self.api.fetch_dataset(kind, period, country, &FilterSet::new())?;
                let provenance = Provenance::new(country, period);
                let sections = split_sections(&raw);

                let mut seen = HashSet::new();
                let mut rows = 0;
                for section in &sections {
                    let sub = classify_section(section);
                    match writers.iter_mut().find(|(known, _)| *known == sub) {
                        Some((_, writer)) => {
                            rows += writer.append_standard(section, &provenance)?;
                            seen.insert(sub);
                        }
                        None => progress.add_warning(format!(
                            "Unrecognized demography table for {} {}: {}",
                            country,
                            period.begin,
                            section.lines().next().unwrap_or("")
                        )),
                    }
                }

                if !sections.is_empty() {
                    for sub in DemographyTable::RECOGNIZED.iter().filter(|sub| !seen.contains(*sub)) {
                        progress.add_warning(format!(
                            "Demography response for {} {} has no {} table",
                            country, period.begin, sub
                        ));
                    }
                }
                progress.update_request(country, period, rows);
            }

            for (sub, writer) in writers {
                if let Some(finished) = writer.finish()? {
                    files.push(OutputFile::from_finished(
                        finished,
                        kind,
                        format!("{}_{}", kind, sub),
                        country,
                    ));
                }
            }
        }

        notify(progress, progress_callback);
        Ok(files)
    }
}

fn notify(progress: &ExtractionProgress, callback: ProgressCallback<'_>) {
    if let Some(callback) = callback {
        callback(progress);
    }
}

/// `(id, name)` pairs of a metrics response.
fn parse_metric_rows(raw: &str) -> Result<Vec<(String, String)>> {
    let mut rows = parse_tsv(raw)?.into_iter();
    let header = match rows.next() {
        Some(header) => header,
        None => return Ok(Vec::new()),
    };
    let column = |name: &str| header.iter().position(|h| h.trim() == name);
    let (id_idx, name_idx) = match (column("id"), column("name")) {
        (Some(id), Some(name)) => (id, name),
        _ => {
            return Err(ExtractorError::InvalidResponse {
                message: "metrics response has no 'id' and 'name' columns".to_string(),
            })
        }
    };

    Ok(rows
        .filter_map(|row| {
            let id = row.get(id_idx)?.trim().to_string();
            let name = row.get(name_idx)?.trim().to_string();
            (!id.is_empty()).then_some((id, name))
        })
        .collect())
}
