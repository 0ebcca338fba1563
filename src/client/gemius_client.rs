use crate::client::VendorApi;
use crate::config::HttpConfig;
use crate::dataset::DatasetKind;
use crate::error::{ExtractorError, Result};
use crate::extractor::FilterSet;
use crate::period::Period;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const ENDPOINT_OPEN_SESSION: &str = "open-session";
const ENDPOINT_AVAILABLE_PERIODS: &str = "available-periods";

/// Bounded exponential backoff for server errors and dropped connections.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub retry_statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
            retry_statuses: config.retry_statuses.clone(),
        }
    }

    /// Sleep before retry number `attempt` (1-based): `factor * 2^(attempt - 1)` seconds.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(16) as i32;
        Duration::from_secs_f64((self.backoff_factor * 2f64.powi(exponent)).max(0.0))
    }

    pub fn should_retry_status(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status.as_u16())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

/// Authenticated Gemius Audience API client. Logs in once on construction.
pub struct GemiusClient {
    http: Client,
    base_url: Url,
    session: String,
    retry: RetryPolicy,
}

impl GemiusClient {
    pub fn connect(config: &HttpConfig, user: &str, password: &str) -> Result<Self> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| ExtractorError::Network {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let mut client = Self {
            http,
            base_url,
            session: String::new(),
            retry: RetryPolicy::from_config(config),
        };
        client.session = client.login(user, password)?;
        Ok(client)
    }

    fn login(&self, user: &str, password: &str) -> Result<String> {
        let url = self.endpoint(ENDPOINT_OPEN_SESSION)?;
        let response = self
            .send_with_retry(|| {
                self.http
                    .post(url.clone())
                    .query(&[("login", user), ("password", password)])
            })
            .map_err(|e| match e {
                ExtractorError::Http { status, body, .. } => ExtractorError::Authentication {
                    message: format!("login rejected with HTTP {}: {}", status, body),
                },
                other => other,
            })?;

        let body: serde_json::Value = response.json().map_err(|e| ExtractorError::InvalidResponse {
            message: format!("open-session returned invalid JSON: {}", e),
        })?;

        body.pointer("/data/session")
            .and_then(|s| s.as_str())
            .map(str::to_string)
            .ok_or_else(|| ExtractorError::Authentication {
                message: "open-session response contains no session".to_string(),
            })
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        Ok(self.base_url.join(name)?)
    }

    fn get_text(&self, endpoint: &str, query: &[(String, String)]) -> Result<String> {
        let url = self.endpoint(endpoint)?;
        debug!(%url, params = query.len(), "GET");
        let response = self.send_with_retry(|| {
            self.http
                .get(url.clone())
                .query(query)
                .query(&[("session", self.session.as_str())])
        })?;
        Ok(response.text()?)
    }

    fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            match build().send() {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if self.retry.should_retry_status(status) && attempt < self.retry.max_retries {
                        attempt += 1;
                        let delay = self.retry.delay(attempt);
                        warn!(status = status.as_u16(), attempt, ?delay, "server error, retrying");
                        thread::sleep(delay);
                        continue;
                    }
                    let url = response.url().to_string();
                    let body = response.text().unwrap_or_default();
                    return Err(ExtractorError::Http {
                        status: status.as_u16(),
                        url,
                        body,
                    });
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    warn!(error = %e, attempt, ?delay, "request failed, retrying");
                    thread::sleep(delay);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Query pairs for a dataset request; list filters repeat their key once per value.
///
/// Without a country the vendor answers for all countries.
pub fn dataset_query(
    kind: DatasetKind,
    period: &Period,
    country: Option<&str>,
    filters: &FilterSet,
) -> Vec<(String, String)> {
    let [begin, end, _] = period.provenance();
    let mut query = vec![
        ("begin".to_string(), begin),
        ("end".to_string(), end),
        ("output".to_string(), "csv".to_string()),
    ];
    if let Some(country) = country {
        query.push(("country".to_string(), country.to_string()));
    }

    if kind == DatasetKind::Stats {
        query.push(("strict".to_string(), "False".to_string()));
        query.extend(filters.query_pairs());
    }

    query
}

impl VendorApi for GemiusClient {
    fn available_periods(&self) -> Result<String> {
        self.get_text(
            ENDPOINT_AVAILABLE_PERIODS,
            &[("output".to_string(), "csv".to_string())],
        )
    }

    fn fetch_dataset(&self, kind: DatasetKind, period: &Period, country: &str, filters: &FilterSet) -> Result<String> {
        self.get_text(kind.endpoint(), &dataset_query(kind, period, Some(country), filters))
    }

    fn fetch_metrics(&self, period: &Period) -> Result<String> {
        let kind = DatasetKind::Metrics;
        self.get_text(kind.endpoint(), &dataset_query(kind, period, None, &FilterSet::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FilterParam;
    use crate::period::PeriodType;
    use chrono::NaiveDate;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread::JoinHandle;

    const SESSION_OK: &str = r#"{"data":{"session":"abc"}}"#;

    /// Local HTTP server answering one connection per canned response, in order.
    /// Returns the base URL, the request lines it saw and the server thread.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let requests = Arc::clone(&seen);
        let handle = thread::spawn(move || {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                requests.lock().unwrap().push(request_line.trim().to_string());
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                }

                write!(
                    stream,
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                )
                .unwrap();
                stream.flush().unwrap();
            }
        });

        (base_url, seen, handle)
    }

    fn http_config(base_url: String, max_retries: u32) -> HttpConfig {
        HttpConfig {
            base_url,
            max_retries,
            backoff_factor: 0.0,
            retry_statuses: vec![500, 502, 504],
            timeout: 5,
        }
    }

    fn period() -> Period {
        let day = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        Period::new(day, day, PeriodType::Daily)
    }

    #[test]
    fn test_backoff_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(1), Duration::from_secs_f64(0.3));
        assert_eq!(policy.delay(2), Duration::from_secs_f64(0.6));
        assert_eq!(policy.delay(4), Duration::from_secs_f64(2.4));
    }

    #[test]
    fn test_retry_statuses() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry_status(StatusCode::BAD_GATEWAY));
        assert!(policy.should_retry_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!policy.should_retry_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!policy.should_retry_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_login_rejected_is_authentication_error() {
        let (base_url, requests, server) = serve(vec![(401, r#"{"error":"bad credentials"}"#)]);

        let err = GemiusClient::connect(&http_config(base_url, 3), "user", "wrong")
            .err()
            .unwrap();
        server.join().unwrap();

        assert!(matches!(err, ExtractorError::Authentication { ref message } if message.contains("401")));
        assert_eq!(requests.lock().unwrap().len(), 1);
        assert!(requests.lock().unwrap()[0].starts_with("POST /open-session?"));
    }

    #[test]
    fn test_login_without_session_is_authentication_error() {
        let (base_url, _, server) = serve(vec![(200, r#"{"data":{}}"#)]);

        let err = GemiusClient::connect(&http_config(base_url, 3), "user", "pass")
            .err()
            .unwrap();
        server.join().unwrap();

        assert!(matches!(err, ExtractorError::Authentication { ref message } if message.contains("no session")));
    }

    #[test]
    fn test_server_errors_are_retried_until_success() {
        let (base_url, requests, server) = serve(vec![
            (200, SESSION_OK),
            (502, ""),
            (500, ""),
            (200, "id\tname\n1\tru\n"),
        ]);

        let client = GemiusClient::connect(&http_config(base_url, 3), "user", "pass").unwrap();
        let body = client.fetch_metrics(&period()).unwrap();
        server.join().unwrap();

        assert_eq!(body, "id\tname\n1\tru\n");
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        assert!(requests[1..].iter().all(|r| r.starts_with("GET /metrics?")));
        assert!(requests[3].contains("session=abc"));
        assert!(!requests[3].contains("country="));
    }

    #[test]
    fn test_retries_stop_after_max_retries() {
        let (base_url, requests, server) = serve(vec![(200, SESSION_OK), (504, ""), (504, ""), (504, "timeout")]);

        let client = GemiusClient::connect(&http_config(base_url, 2), "user", "pass").unwrap();
        let err = client
            .fetch_dataset(DatasetKind::Geos, &period(), "PL", &FilterSet::new())
            .unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, ExtractorError::Http { status: 504, ref body, .. } if body == "timeout"));
        assert!(err.is_transport());
        assert_eq!(requests.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_other_statuses_fail_without_retry() {
        for status in [404u16, 503] {
            let (base_url, requests, server) = serve(vec![(200, SESSION_OK), (status, "nope")]);

            let client = GemiusClient::connect(&http_config(base_url, 5), "user", "pass").unwrap();
            let err = client
                .fetch_dataset(DatasetKind::Trees, &period(), "US", &FilterSet::new())
                .unwrap_err();
            server.join().unwrap();

            assert!(matches!(err, ExtractorError::Http { status: s, .. } if s == status));
            assert_eq!(requests.lock().unwrap().len(), 2);
        }
    }

    #[test]
    fn test_standard_query_ignores_filters() {
        let mut filters = FilterSet::new();
        filters.insert(FilterParam::Geo, vec!["1".to_string()]);

        let query = dataset_query(DatasetKind::Geos, &period(), Some("US"), &filters);
        let keys: Vec<&str> = query.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["begin", "end", "output", "country"]);
    }

    #[test]
    fn test_stats_query_repeats_filter_keys() {
        let mut filters = FilterSet::new();
        filters.insert(FilterParam::Node, vec!["10".to_string(), "11".to_string()]);
        filters.insert(FilterParam::Metric, vec!["ru".to_string()]);

        let query = dataset_query(DatasetKind::Stats, &period(), Some("PL"), &filters);
        let nodes: Vec<&str> = query
            .iter()
            .filter(|(k, _)| k == "node")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(nodes, vec!["10", "11"]);
        assert!(query.contains(&("strict".to_string(), "False".to_string())));
        assert!(query.contains(&("metric".to_string(), "ru".to_string())));
    }

    #[test]
    fn test_metrics_query_has_no_country() {
        let query = dataset_query(DatasetKind::Metrics, &period(), None, &FilterSet::new());
        let keys: Vec<&str> = query.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["begin", "end", "output"]);
    }
}
