use crate::client::VendorApi;
use crate::dataset::DatasetKind;
use crate::error::{ExtractorError, Result};
use crate::extractor::FilterSet;
use crate::period::Period;
use std::cell::RefCell;
use std::collections::HashMap;

/// In-memory API: canned responses keyed by dataset, country and period begin.
/// Unknown combinations answer with an empty body.
#[derive(Default)]
pub struct StaticApi {
    periods: String,
    responses: HashMap<(DatasetKind, String, String), String>,
    failing: Option<DatasetKind>,
    calls: RefCell<Vec<(DatasetKind, String, String, String)>>,
}

impl StaticApi {
    pub fn new<S: Into<String>>(periods: S) -> Self {
        Self {
            periods: periods.into(),
            ..Self::default()
        }
    }

    pub fn with_response(mut self, kind: DatasetKind, country: &str, begin: &str, body: &str) -> Self {
        self.responses
            .insert((kind, country.to_string(), begin.to_string()), body.to_string());
        self
    }

    /// Metrics listing for the period starting at `begin`.
    pub fn with_metrics(self, begin: &str, body: &str) -> Self {
        self.with_response(DatasetKind::Metrics, "", begin, body)
    }

    pub fn failing_on(mut self, kind: DatasetKind) -> Self {
        self.failing = Some(kind);
        self
    }

    /// (dataset, country, begin, serialized filters) for every fetch, in call order.
    /// Metrics requests carry an empty country.
    pub fn calls(&self) -> Vec<(DatasetKind, String, String, String)> {
        self.calls.borrow().clone()
    }
}

impl VendorApi for StaticApi {
    fn available_periods(&self) -> Result<String> {
        Ok(self.periods.clone())
    }

    fn fetch_dataset(&self, kind: DatasetKind, period: &Period, country: &str, filters: &FilterSet) -> Result<String> {
        let begin = period.begin.format("%Y-%m-%d").to_string();
        self.calls
            .borrow_mut()
            .push((kind, country.to_string(), begin.clone(), filters.describe()));

        if self.failing == Some(kind) {
            return Err(ExtractorError::Http {
                status: 504,
                url: kind.endpoint().to_string(),
                body: "gateway timeout".to_string(),
            });
        }

        Ok(self
            .responses
            .get(&(kind, country.to_string(), begin))
            .cloned()
            .unwrap_or_default())
    }

    fn fetch_metrics(&self, period: &Period) -> Result<String> {
        self.fetch_dataset(DatasetKind::Metrics, period, "", &FilterSet::new())
    }
}
