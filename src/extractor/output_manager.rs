use crate::dataset::DatasetKind;
use crate::error::{ExtractorError, Result};
use crate::extractor::{ExtractionProgress, OutputFile};
use crate::period::{Interval, PeriodType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const BUCKET_PREFIX: &str = "in.c-esnerda-ex-gemius";
const REPORT_FILE: &str = "run_report.json";

/// Sidecar describing where a table is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub destination: String,
    pub primary_key: Vec<String>,
    pub incremental: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub dataset: DatasetKind,
    pub period_type: PeriodType,
    pub file_uid: usize,
    pub files: usize,
    pub rows: usize,
    pub requests: usize,
    pub duration: Duration,
    pub warnings: Vec<String>,
}

impl DatasetSummary {
    pub fn new(period_type: PeriodType, file_uid: usize, files: &[OutputFile], progress: &ExtractionProgress) -> Self {
        Self {
            dataset: progress.dataset,
            period_type,
            file_uid,
            files: files.len(),
            rows: files.iter().map(|f| f.row_count).sum(),
            requests: progress.requests_done,
            duration: progress.elapsed(),
            warnings: progress.warnings.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub interval: Interval,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub datasets: Vec<DatasetSummary>,
    pub files: Vec<OutputFile>,
}

impl RunReport {
    pub fn total_rows(&self) -> usize {
        self.files.iter().map(|f| f.row_count).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.datasets.iter().map(|d| d.warnings.len()).sum()
    }
}

/// Owns the `out/` side of the data directory.
pub struct OutputManager {
    data_dir: PathBuf,
    tables_dir: PathBuf,
    config_id: String,
    bucket: Option<String>,
}

impl OutputManager {
    pub fn new(data_dir: PathBuf, config_id: Option<String>) -> Result<Self> {
        let tables_dir = data_dir.join("out").join("tables");

        let manager = Self {
            data_dir,
            tables_dir,
            config_id: config_id
                .map(|id| sanitize_name(&id))
                .unwrap_or_else(|| "default".to_string()),
            bucket: None,
        };

        manager.validate_paths()?;
        Ok(manager)
    }

    pub fn with_bucket(mut self, bucket: Option<String>) -> Self {
        self.bucket = bucket
            .map(|b| sanitize_name(&b))
            .filter(|b| !b.is_empty());
        self
    }

    pub fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.tables_dir)?;
        Ok(())
    }

    pub fn tables_dir(&self) -> &Path {
        &self.tables_dir
    }

    pub fn report_path(&self) -> PathBuf {
        self.data_dir.join("out").join(REPORT_FILE)
    }

    /// `in.c-esnerda-ex-gemius-<config_id>[-<bucket>].<table>`
    pub fn destination(&self, table: &str) -> String {
        match &self.bucket {
            Some(bucket) => format!("{}-{}-{}.{}", BUCKET_PREFIX, self.config_id, bucket, table),
            None => format!("{}-{}.{}", BUCKET_PREFIX, self.config_id, table),
        }
    }

    pub fn write_manifest(&self, file: &OutputFile) -> Result<PathBuf> {
        let manifest = Manifest {
            destination: self.destination(&file.table),
            primary_key: file.primary_key.clone(),
            incremental: true,
        };

        let mut manifest_path = file.path.clone().into_os_string();
        manifest_path.push(".manifest");
        let manifest_path = PathBuf::from(manifest_path);

        let content = serde_json::to_string_pretty(&manifest).map_err(|e| ExtractorError::Config {
            message: format!("Failed to serialize manifest: {}", e),
        })?;
        fs::write(&manifest_path, content)?;

        debug!(path = %manifest_path.display(), destination = %manifest.destination, "wrote manifest");
        Ok(manifest_path)
    }

    pub fn write_manifests(&self, files: &[OutputFile]) -> Result<()> {
        for file in files {
            self.write_manifest(file)?;
        }
        Ok(())
    }

    pub fn save_report(&self, report: &RunReport) -> Result<PathBuf> {
        let path = self.report_path();
        let json = serde_json::to_string_pretty(report).map_err(|e| ExtractorError::Config {
            message: format!("Failed to serialize report to JSON: {}", e),
        })?;
        fs::write(&path, json)?;
        Ok(path)
    }

    fn validate_paths(&self) -> Result<()> {
        if !self.data_dir.exists() {
            fs::create_dir_all(&self.data_dir).map_err(|e| ExtractorError::Permission {
                path: format!("Cannot create data directory {}: {}", self.data_dir.display(), e),
            })?;
        }

        let test_file = self.data_dir.join(".gemius_write_test");
        match fs::File::create(&test_file) {
            Ok(_) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                return Err(ExtractorError::Permission {
                    path: format!("No write permission for directory {}: {}", self.data_dir.display(), e),
                });
            }
        }

        Ok(())
    }
}

/// Keeps bucket and table name parts to characters the storage accepts.
fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
