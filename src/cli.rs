use crate::config::{CliOverrides, Config};
use crate::error::Result;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gemius-extractor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract Gemius Audience datasets into CSV tables")]
#[command(
    long_about = "gemius-extractor resolves a date interval into the periods Gemius Audience offers, \
                  downloads the configured datasets for every country and period, and writes flat \
                  CSV tables with load manifests into <data-dir>/out/tables."
)]
#[command(after_help = "EXAMPLES:\n  \
    gemius-extractor --config gemius-extractor.toml\n  \
    gemius-extractor --config cfg.toml --from 2023-01-01 --to 2023-02-01\n  \
    gemius-extractor --config cfg.toml --relative \"7 days ago\" --data-dir /data\n  \
    gemius-extractor --generate-config --config gemius-extractor.toml")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Data directory holding in/tables and out/tables
    #[arg(long, env = "KBC_DATADIR")]
    pub data_dir: Option<PathBuf>,

    /// Configuration id used in destination bucket names
    #[arg(long, env = "KBC_CONFIGID")]
    pub config_id: Option<String>,

    /// Gemius API login
    #[arg(short, long, env = "GEMIUS_USER")]
    pub user: Option<String>,

    /// Gemius API password
    #[arg(long, env = "GEMIUS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// First day of the interval (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,

    /// Day after the last day of the interval (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,

    /// Relative start such as "yesterday" or "3 weeks ago"; the interval ends today
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub relative: Option<String>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Dry run (validate and show the plan without downloading)
    #[arg(long, help = "Validate configuration and show what would be extracted")]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_data_dir(self.data_dir.clone())
            .with_config_id(self.config_id.clone())
            .with_credentials(self.user.clone(), self.password.clone())
            .with_interval(self.from, self.to)
            .with_relative(self.relative.clone())
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "gemius_extractor=error";
        }
        match self.verbose {
            0 => "gemius_extractor=warn",
            1 => "gemius_extractor=info",
            2 => "gemius_extractor=debug",
            _ => "gemius_extractor=trace,reqwest=debug",
        }
    }
}

pub fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}
