use clap::Parser;
use gemius_extractor::{Cli, ExtractorError, GemiusExtractor, OutputFormatter, OutputMode, UserFriendlyError};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();
    setup_logging(&cli);

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let extractor = match GemiusExtractor::from_cli(&cli) {
        Ok(extractor) => extractor,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for(&e);
        }
    };

    if cli.dry_run {
        return handle_dry_run(&extractor);
    }

    match extractor.run().await {
        Ok(report) => {
            extractor.output_formatter().print_run_summary(&report);
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "extraction failed");
            extractor.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

/// Configuration problems exit with 2, authentication with 3, other transport errors with 4.
fn exit_code_for(error: &ExtractorError) -> i32 {
    match error {
        ExtractorError::Authentication { .. } => 3,
        e if e.is_configuration() => 2,
        e if e.is_transport() => 4,
        _ => 1,
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "gemius-extractor.toml".to_string());

    match GemiusExtractor::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path);
            println!("\nTo use this configuration:");
            println!("  gemius-extractor --config {}", config_path);
            println!("\nEdit the credentials, period and datasets before running.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_dry_run(extractor: &GemiusExtractor) -> i32 {
    let formatter = extractor.output_formatter();
    let config = extractor.config();

    formatter.print_header("Dry run - nothing will be downloaded");

    let interval = match extractor.resolve_interval(chrono::Utc::now()) {
        Ok(interval) => interval,
        Err(e) => {
            formatter.print_user_friendly_error(&e);
            return exit_code_for(&e);
        }
    };

    println!("  Interval:     {}", interval);
    println!("  API:          {}", config.http.base_url);
    println!("  Output:       {}", config.tables_out_dir().display());
    println!("  Retries:      {} (backoff {}s)", config.http.max_retries, config.http.backoff_factor);
    formatter.print_separator();

    for (index, dataset) in config.datasets.iter().enumerate() {
        let countries = if dataset.countries.is_empty() {
            "all countries".to_string()
        } else {
            dataset.countries.join(", ")
        };
        println!(
            "  #{} {} [{}] for {}",
            index + 1,
            dataset.dataset_type,
            dataset.period_type,
            countries
        );
        for filter in &dataset.filters {
            println!("      {} <- {}", filter.filter, filter.source);
        }
    }

    formatter.print_separator();
    formatter.success("Configuration is valid");
    0
}

fn print_startup_error(error: &ExtractorError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}

fn setup_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemius_extractor::Config;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_generate_config_command() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let cli = Cli::try_parse_from([
            "gemius-extractor",
            "--generate-config",
            "--config",
            config_path.to_str().unwrap(),
        ])
        .unwrap();

        assert_eq!(handle_generate_config(&cli), 0);
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[credentials]"));
        assert!(content.contains("[[datasets]]"));
    }

    #[test]
    fn test_exit_codes() {
        let missing = ExtractorError::MissingParameters {
            fields: vec!["credentials.user".to_string()],
        };
        assert_eq!(exit_code_for(&missing), 2);

        let auth = ExtractorError::Authentication {
            message: "bad password".to_string(),
        };
        assert_eq!(exit_code_for(&auth), 3);

        let http = ExtractorError::Http {
            status: 504,
            url: "stats".to_string(),
            body: String::new(),
        };
        assert_eq!(exit_code_for(&http), 4);

        let io = ExtractorError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert_eq!(exit_code_for(&io), 1);
    }

    #[test]
    fn test_dry_run_mode() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("cfg.toml");
        fs::write(&config_path, Config::create_sample_config()).unwrap();
        let config = Config::load_from_file(&config_path).unwrap();

        let extractor = GemiusExtractor::new(config, OutputMode::Plain, 0, true);
        assert_eq!(handle_dry_run(&extractor), 0);
    }
}
