use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing mandatory configuration fields: [{}]", fields.join(", "))]
    MissingParameters { fields: Vec<String> },

    #[error("Specified input table [{name}] does not exist")]
    TableNotFound { name: String },

    #[error("Unsupported dataset: {name}")]
    UnsupportedDataset { name: String },

    #[error("Invalid filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Invalid relative period: {expression}")]
    InvalidRelativePeriod { expression: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Request failed with code: {status}, message: {body}")]
    Http { status: u16, url: String, body: String },

    #[error("Network error occurred: {message}")]
    Network { message: String },

    #[error("Invalid response from API: {message}")]
    InvalidResponse { message: String },

    #[error("CSV processing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Permission denied: {path}")]
    Permission { path: String },
}

impl ExtractorError {
    /// Errors raised by configuration problems, detectable before any download.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ExtractorError::Config { .. }
                | ExtractorError::MissingParameters { .. }
                | ExtractorError::TableNotFound { .. }
                | ExtractorError::UnsupportedDataset { .. }
                | ExtractorError::InvalidFilter { .. }
                | ExtractorError::InvalidRelativePeriod { .. }
        )
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ExtractorError::Authentication { .. }
                | ExtractorError::Http { .. }
                | ExtractorError::Network { .. }
        )
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for ExtractorError {
    fn user_message(&self) -> String {
        match self {
            ExtractorError::MissingParameters { fields } => {
                format!("Missing mandatory configuration fields: {}", fields.join(", "))
            }
            ExtractorError::TableNotFound { name } => {
                format!("Input table not found: {}", name)
            }
            ExtractorError::Http { status, url, body } => {
                format!("Request to {} failed with HTTP {}: {}", url, status, truncate(body, 200))
            }
            ExtractorError::Permission { path } => {
                format!("Permission denied accessing: {}", path)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            ExtractorError::MissingParameters { .. } => Some(
                "Fill in the listed fields in the configuration file or pass them on the command line. \
                 The period needs either 'relative' or both 'from' and 'to'."
                    .to_string(),
            ),
            ExtractorError::TableNotFound { .. } => Some(
                "Add the table to [[input_tables]] or use an inline list such as \"['1', '2']\" as the filter source."
                    .to_string(),
            ),
            ExtractorError::UnsupportedDataset { .. } => Some(
                "Supported datasets are: stats, geos, nodes, platforms, metrics, trees, demography.".to_string(),
            ),
            ExtractorError::InvalidRelativePeriod { .. } => Some(
                "Use expressions like 'today', 'yesterday', '3 days ago', '2 weeks ago' or '1 month ago'.".to_string(),
            ),
            ExtractorError::Authentication { .. } => Some(
                "Check the Gemius user name and password.".to_string(),
            ),
            ExtractorError::Network { .. } | ExtractorError::Http { .. } => Some(
                "The Gemius API may be temporarily unavailable. Try again later or raise http.max_retries.".to_string(),
            ),
            ExtractorError::Config { .. } | ExtractorError::InvalidFilter { .. } => Some(
                "Check your configuration file syntax and ensure all required fields are present.".to_string(),
            ),
            ExtractorError::Permission { .. } => Some(
                "Ensure you have the necessary read/write permissions for the data directory.".to_string(),
            ),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExtractorError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => ExtractorError::Http {
                status: status.as_u16(),
                url: error.url().map(|u| u.to_string()).unwrap_or_default(),
                body: error.to_string(),
            },
            None => ExtractorError::Network {
                message: error.to_string(),
            },
        }
    }
}

impl From<url::ParseError> for ExtractorError {
    fn from(error: url::ParseError) -> Self {
        ExtractorError::Config {
            message: format!("Invalid API URL: {}", error),
        }
    }
}

impl From<toml::de::Error> for ExtractorError {
    fn from(error: toml::de::Error) -> Self {
        ExtractorError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractorError>;

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameters_message() {
        let error = ExtractorError::MissingParameters {
            fields: vec!["user".to_string(), "period.relative".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Missing mandatory configuration fields: [user, period.relative]"
        );
        assert!(error.suggestion().is_some());
        assert!(error.is_configuration());
        assert!(!error.is_transport());
    }

    #[test]
    fn test_transport_classification() {
        let error = ExtractorError::Http {
            status: 502,
            url: "https://api-audience.gemius.com/v1/stats".to_string(),
            body: "bad gateway".to_string(),
        };
        assert!(error.is_transport());
        assert!(error.user_message().contains("HTTP 502"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
