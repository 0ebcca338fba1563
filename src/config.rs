use crate::dataset::{DatasetKind, FilterParam};
use crate::error::{ExtractorError, Result};
use crate::extractor::parse_literal_list;
use crate::period::PeriodType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_API_BASE: &str = "https://api-audience.gemius.com/v1/";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub credentials: CredentialsConfig,
    pub period: PeriodConfig,
    pub output: OutputConfig,
    pub http: HttpConfig,
    pub datasets: Vec<DatasetConfig>,
    pub input_tables: Vec<InputTable>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Requested interval: either `relative` or both `from` and `to` (exclusive).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PeriodConfig {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub relative: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
    pub bucket: Option<String>,
    pub config_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub retry_statuses: Vec<u16>,
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    pub dataset_type: DatasetKind,
    #[serde(default)]
    pub period_type: PeriodType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub countries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterSpec>,
}

/// One stats filter: a literal list (`"['1', '2']"`) or the name of an input table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSpec {
    pub filter: FilterParam,
    pub source: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputTable {
    pub name: String,
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::current_dir()
                .map(|dir| dir.join("data"))
                .unwrap_or_else(|_| PathBuf::from("data")),
            bucket: None,
            config_id: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            max_retries: 10,
            backoff_factor: 0.3,
            retry_statuses: vec![500, 502, 504],
            timeout: 300, // 5 minutes
        }
    }
}

impl DatasetConfig {
    pub fn new(dataset_type: DatasetKind, period_type: PeriodType) -> Self {
        Self {
            dataset_type,
            period_type,
            countries: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn with_filter<S: Into<String>>(mut self, filter: FilterParam, source: S) -> Self {
        self.filters.push(FilterSpec {
            filter,
            source: source.into(),
        });
        self
    }

}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ExtractorError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ExtractorError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ExtractorError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["gemius-extractor.toml", ".gemius-extractor.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref data_dir) = cli_args.data_dir {
            self.output.data_dir = data_dir.clone();
        }

        if let Some(ref config_id) = cli_args.config_id {
            self.output.config_id = Some(config_id.clone());
        }

        if let Some(ref user) = cli_args.user {
            self.credentials.user = Some(user.clone());
        }

        if let Some(ref password) = cli_args.password {
            self.credentials.password = Some(password.clone());
        }

        // An explicit interval on the command line wins over a configured one.
        if cli_args.from.is_some() || cli_args.to.is_some() {
            self.period.relative = None;
        }
        if let Some(from) = cli_args.from {
            self.period.from = Some(from);
        }
        if let Some(to) = cli_args.to {
            self.period.to = Some(to);
        }
        if let Some(ref relative) = cli_args.relative {
            self.period.relative = Some(relative.clone());
        }
    }

    /// Checks mandatory fields and per-dataset rules.
    ///
    /// All missing fields are reported together. The period group is satisfied by
    /// `relative` alone or by both `from` and `to`.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if is_blank(&self.credentials.user) {
            missing.push("credentials.user".to_string());
        }
        if is_blank(&self.credentials.password) {
            missing.push("credentials.password".to_string());
        }
        if self.datasets.is_empty() {
            missing.push("datasets".to_string());
        }
        if is_blank(&self.period.relative) {
            let mut period_missing = vec!["period.relative".to_string()];
            if self.period.from.is_none() {
                period_missing.push("period.from".to_string());
            }
            if self.period.to.is_none() {
                period_missing.push("period.to".to_string());
            }
            if period_missing.len() > 1 {
                missing.extend(period_missing);
            }
        }

        if !missing.is_empty() {
            return Err(ExtractorError::MissingParameters { fields: missing });
        }

        if is_blank(&self.period.relative) {
            if let (Some(from), Some(to)) = (self.period.from, self.period.to) {
                if from >= to {
                    return Err(ExtractorError::Config {
                        message: format!("period.from ({}) must be before period.to ({})", from, to),
                    });
                }
            }
        }

        for dataset in &self.datasets {
            if !dataset.filters.is_empty() && !dataset.dataset_type.accepts_filters() {
                return Err(ExtractorError::Config {
                    message: format!(
                        "Dataset '{}' does not accept filters; only 'stats' does",
                        dataset.dataset_type
                    ),
                });
            }
            self.validate_filter_sources(dataset)?;
        }

        if self.http.base_url.trim().is_empty() {
            return Err(ExtractorError::Config {
                message: "http.base_url must not be empty".to_string(),
            });
        }

        if self.http.timeout == 0 {
            return Err(ExtractorError::Config {
                message: "http.timeout must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Literal lists must parse and table sources must name a declared input table.
    fn validate_filter_sources(&self, dataset: &DatasetConfig) -> Result<()> {
        for spec in &dataset.filters {
            let source = spec.source.trim();
            if source.starts_with('[') {
                parse_literal_list(source).map_err(|message| ExtractorError::InvalidFilter {
                    filter: spec.filter.to_string(),
                    message,
                })?;
            } else {
                self.input_table_path(source)?;
            }
        }
        Ok(())
    }

    pub fn tables_in_dir(&self) -> PathBuf {
        self.output.data_dir.join("in").join("tables")
    }

    pub fn tables_out_dir(&self) -> PathBuf {
        self.output.data_dir.join("out").join("tables")
    }

    /// Path of a named input table; relative paths live under `in/tables`.
    pub fn input_table_path(&self, name: &str) -> Result<PathBuf> {
        let table = self
            .input_tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ExtractorError::TableNotFound {
                name: name.to_string(),
            })?;

        if table.path.is_absolute() {
            Ok(table.path.clone())
        } else {
            Ok(self.tables_in_dir().join(&table.path))
        }
    }

    pub fn create_sample_config() -> String {
        let mut sample = Self::default();
        sample.credentials.user = Some("user@example.com".to_string());
        sample.credentials.password = Some("secret".to_string());
        sample.period.relative = Some("7 days ago".to_string());
        sample.output.data_dir = PathBuf::from("data");
        sample.datasets = vec![
            DatasetConfig::new(DatasetKind::Geos, PeriodType::Daily),
            DatasetConfig::new(DatasetKind::Demography, PeriodType::Monthly),
            DatasetConfig::new(DatasetKind::Stats, PeriodType::Daily)
                .with_filter(FilterParam::Metric, "['ru', 'pv']")
                .with_filter(FilterParam::Node, "nodes"),
        ];
        sample.input_tables = vec![InputTable {
            name: "nodes".to_string(),
            path: PathBuf::from("nodes.csv"),
        }];
        toml::to_string_pretty(&sample).unwrap_or_else(|_| String::new())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub data_dir: Option<PathBuf>,
    pub config_id: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub relative: Option<String>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        self.data_dir = data_dir;
        self
    }

    pub fn with_config_id(mut self, config_id: Option<String>) -> Self {
        self.config_id = config_id;
        self
    }

    pub fn with_credentials(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.user = user;
        self.password = password;
        self
    }

    pub fn with_interval(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_relative(mut self, relative: Option<String>) -> Self {
        self.relative = relative;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.credentials.user = Some("user".to_string());
        config.credentials.password = Some("pass".to_string());
        config.period.from = Some(date("2023-01-01"));
        config.period.to = Some(date("2023-01-03"));
        config.datasets = vec![DatasetConfig::new(DatasetKind::Geos, PeriodType::Daily)];
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.http.max_retries, 10);
        assert_eq!(config.http.retry_statuses, vec![500, 502, 504]);
        assert_eq!(config.http.base_url, DEFAULT_API_BASE);
        assert!(config.datasets.is_empty());
    }

    #[test]
    fn test_config_validation() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        config.period.to = None;
        config.period.relative = Some("3 days ago".to_string());
        assert!(config.validate().is_ok());

        config.period.relative = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let config = Config::default();
        match config.validate() {
            Err(ExtractorError::MissingParameters { fields }) => {
                assert_eq!(
                    fields,
                    vec![
                        "credentials.user",
                        "credentials.password",
                        "datasets",
                        "period.relative",
                        "period.from",
                        "period.to",
                    ]
                );
            }
            other => panic!("expected missing parameters, got {:?}", other),
        }
    }

    #[test]
    fn test_filters_rejected_on_standard_dataset() {
        let mut config = valid_config();
        config.datasets = vec![
            DatasetConfig::new(DatasetKind::Nodes, PeriodType::Daily).with_filter(FilterParam::Geo, "['1']"),
        ];
        assert!(matches!(config.validate(), Err(ExtractorError::Config { .. })));
    }

    #[test]
    fn test_unknown_filter_table_rejected() {
        let mut config = valid_config();
        config.datasets = vec![
            DatasetConfig::new(DatasetKind::Stats, PeriodType::Daily).with_filter(FilterParam::Node, "no_such_table"),
        ];
        assert!(matches!(
            config.validate(),
            Err(ExtractorError::TableNotFound { name }) if name == "no_such_table"
        ));

        config.input_tables.push(InputTable {
            name: "no_such_table".to_string(),
            path: PathBuf::from("nodes.csv"),
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_literal_filter_rejected() {
        let content = r#"
[credentials]
user = "user"
password = "pass"

[period]
relative = "3 days ago"

[[datasets]]
dataset_type = "stats"

[[datasets.filters]]
filter = "metric"
source = "['ru'"
"#;
        let config: Config = toml::from_str(content).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ExtractorError::InvalidFilter { ref filter, .. } if filter == "metric"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_inverted_interval_rejected() {
        let mut config = valid_config();
        config.period.from = Some(date("2023-02-01"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_operations() {
        let config = valid_config();
        let temp_file = NamedTempFile::new().unwrap();

        std::fs::write(temp_file.path(), toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.period.from, config.period.from);
        assert_eq!(loaded.datasets.len(), 1);
        assert_eq!(loaded.datasets[0].dataset_type, DatasetKind::Geos);
    }

    #[test]
    fn test_unsupported_dataset_rejected_at_load() {
        let toml = r#"
            [[datasets]]
            dataset_type = "audiences"
        "#;
        let parsed: std::result::Result<Config, _> = toml::from_str(toml);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_unknown_filter_rejected_at_load() {
        let toml = r#"
            [[datasets]]
            dataset_type = "stats"

            [[datasets.filters]]
            filter = "colour"
            source = "['red']"
        "#;
        let parsed: std::result::Result<Config, _> = toml::from_str(toml);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_dataset_toml_parsing() {
        let toml = r#"
            [credentials]
            user = "u"
            password = "p"

            [period]
            from = "2023-01-01"
            to = "2023-01-31"

            [[datasets]]
            dataset_type = "stats"
            period_type = "weekly"

            [[datasets.filters]]
            filter = "target"
            source = "['Women;gender=2']"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        let dataset = &config.datasets[0];
        assert_eq!(dataset.period_type, PeriodType::Weekly);
        assert_eq!(dataset.filters[0].filter, FilterParam::Target);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = valid_config();
        config.period.relative = Some("2 days ago".to_string());

        let overrides = CliOverrides::new()
            .with_config_id(Some("123".to_string()))
            .with_interval(Some(date("2023-03-01")), Some(date("2023-03-05")));

        config.merge_with_cli_args(&overrides);

        assert_eq!(config.output.config_id.as_deref(), Some("123"));
        assert_eq!(config.period.relative, None);
        assert_eq!(config.period.from, Some(date("2023-03-01")));
    }

    #[test]
    fn test_input_table_resolution() {
        let mut config = valid_config();
        config.output.data_dir = PathBuf::from("/data");
        config.input_tables = vec![InputTable {
            name: "nodes".to_string(),
            path: PathBuf::from("nodes.csv"),
        }];

        assert_eq!(
            config.input_table_path("nodes").unwrap(),
            PathBuf::from("/data/in/tables/nodes.csv")
        );
        assert!(matches!(
            config.input_table_path("geos"),
            Err(ExtractorError::TableNotFound { .. })
        ));
    }

    #[test]
    fn test_sample_config_generation() {
        let sample = Config::create_sample_config();
        assert!(sample.contains("[credentials]"));
        assert!(sample.contains("[[datasets]]"));
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
