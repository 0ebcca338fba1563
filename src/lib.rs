pub mod cli;
pub mod client;
pub mod config;
pub mod dataset;
pub mod dates;
pub mod error;
pub mod extractor;
pub mod period;
pub mod reshape;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, DatasetConfig, FilterSpec};
pub use error::{ExtractorError, Result, UserFriendlyError};

// Core functionality re-exports
pub use client::{GemiusClient, VendorApi};
pub use dataset::{DatasetKind, FilterParam};
pub use extractor::{DatasetExtractor, ExtractionProgress, OutputFile, OutputManager, RunReport};
pub use period::{Interval, Period, PeriodResolver, PeriodSet, PeriodType};
pub use ui::{OutputFormatter, OutputMode, ProgressManager};

use chrono::{DateTime, Days, Utc};
use crate::extractor::{planned_requests, DatasetSummary};
use std::path::Path;
use tracing::info;

/// Main library interface: one configured extraction run.
pub struct GemiusExtractor {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
}

impl GemiusExtractor {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self {
            config,
            output_formatter: OutputFormatter::new(output_mode, verbose, quiet),
            progress_manager: ProgressManager::new(!quiet && output_mode == OutputMode::Human),
        }
    }

    /// Create an extractor from CLI arguments; the configuration is validated here.
    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Ok(Self::new(config, output_mode, cli_args.verbosity_level(), cli_args.quiet))
    }

    /// The requested interval, `end` exclusive.
    ///
    /// A relative expression gives the start and the interval runs through today.
    pub fn resolve_interval(&self, now: DateTime<Utc>) -> Result<Interval> {
        let period = &self.config.period;

        let interval = match period.relative.as_deref().map(str::trim) {
            Some(relative) if !relative.is_empty() => {
                let begin = dates::past_date(relative, now)?;
                let end = now
                    .date_naive()
                    .checked_add_days(Days::new(1))
                    .ok_or_else(|| ExtractorError::InvalidRelativePeriod {
                        expression: relative.to_string(),
                    })?;
                Interval::new(begin, end)
            }
            _ => match (period.from, period.to) {
                (Some(from), Some(to)) => Interval::new(from, to),
                _ => {
                    return Err(ExtractorError::MissingParameters {
                        fields: vec!["period.from".to_string(), "period.to".to_string()],
                    })
                }
            },
        };

        if interval.begin >= interval.end {
            return Err(ExtractorError::Config {
                message: format!("Empty interval {}", interval),
            });
        }
        Ok(interval)
    }

    /// Runs the extraction on a blocking worker of the multi-threaded runtime.
    pub async fn run(&self) -> Result<RunReport> {
        tokio::task::block_in_place(|| self.run_blocking())
    }

    pub fn run_blocking(&self) -> Result<RunReport> {
        let interval = self.resolve_interval(Utc::now())?;
        let (user, password) = match (&self.config.credentials.user, &self.config.credentials.password) {
            (Some(user), Some(password)) => (user.as_str(), password.as_str()),
            _ => {
                return Err(ExtractorError::MissingParameters {
                    fields: vec!["credentials.user".to_string(), "credentials.password".to_string()],
                })
            }
        };

        let spinner = self.progress_manager.create_spinner("Opening API session");
        let client = GemiusClient::connect(&self.config.http, user, password);
        spinner.finish_and_clear();
        let client = client?;
        self.output_formatter.success("Authenticated");

        self.run_with_api(&client, interval)
    }

    /// Extracts every configured dataset over `interval`, in declared order.
    ///
    /// The first failing dataset aborts the run; manifests and the report are only
    /// written after all datasets succeeded.
    pub fn run_with_api<A: VendorApi + ?Sized>(&self, api: &A, interval: Interval) -> Result<RunReport> {
        let started_at = Utc::now();
        let output_manager = self.setup_output_directory()?;

        let resolver = PeriodResolver::new(api);
        let extractor = DatasetExtractor::new(api, &self.config, output_manager.tables_dir());

        let mut summaries = Vec::new();
        let mut files = Vec::new();

        for (index, request) in self.config.datasets.iter().enumerate() {
            let file_uid = index + 1;
            self.output_formatter.start_operation(&format!(
                "Downloading {} ({}) in {}",
                request.dataset_type, request.period_type, interval
            ));
            info!(dataset = %request.dataset_type, period_type = %request.period_type, %interval, "downloading dataset");

            let periods = resolver.resolve(interval, request.period_type, &request.countries)?;

            let pb = self.progress_manager.create_dataset_progress(
                request.dataset_type,
                planned_requests(request.dataset_type, &periods) as u64,
            );
            let progress_callback = {
                let pb = pb.clone();
                move |progress: &ExtractionProgress| {
                    ui::progress::update_dataset_progress(&pb, progress);
                }
            };

            let (dataset_files, progress) = match extractor.extract(request, &periods, file_uid, Some(&progress_callback)) {
                Ok(result) => result,
                Err(e) => {
                    pb.abandon_with_message(format!("failed: {}", e));
                    return Err(e);
                }
            };

            ui::progress::finish_progress_with_summary(
                &pb,
                &format!("{} files, {} rows", dataset_files.len(), progress.rows_written),
                progress.elapsed(),
            );
            for warning in &progress.warnings {
                self.output_formatter.warning(warning);
            }
            self.output_formatter.info(&format!(
                "{}: {} files written",
                request.dataset_type,
                dataset_files.len()
            ));

            summaries.push(DatasetSummary::new(request.period_type, file_uid, &dataset_files, &progress));
            files.extend(dataset_files);
        }

        self.progress_manager.clear();
        self.output_formatter.debug("Building manifest files");
        output_manager.write_manifests(&files)?;

        let report = RunReport {
            interval,
            started_at,
            finished_at: Utc::now(),
            datasets: summaries,
            files,
        };
        let report_path = output_manager.save_report(&report)?;
        self.output_formatter
            .debug(&format!("Run report saved to {}", report_path.display()));

        info!(files = report.files.len(), rows = report.total_rows(), "extraction finished");
        Ok(report)
    }

    fn setup_output_directory(&self) -> Result<OutputManager> {
        let manager = OutputManager::new(
            self.config.output.data_dir.clone(),
            self.config.output.config_id.clone(),
        )?
        .with_bucket(self.config.output.bucket.clone());

        manager.initialize()?;
        self.output_formatter.debug(&format!(
            "Initialized output directory: {}",
            manager.tables_dir().display()
        ));

        Ok(manager)
    }

    /// Generate sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        std::fs::write(output_path.as_ref(), Config::create_sample_config())?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn progress_manager(&self) -> &ProgressManager {
        &self.progress_manager
    }

    /// Handle error with user-friendly output
    pub fn handle_error(&self, error: &ExtractorError) {
        self.progress_manager.clear();
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// Get version information
pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Get build information
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        target: std::env::consts::ARCH.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_date: &'static str,
    pub target: String,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "gemius-extractor {} ({}) built on {} for {}",
            self.version, self.git_hash, self.build_date, self.target
        )
    }
}
