pub mod gemius_client;
#[cfg(test)]
pub mod mock;

pub use gemius_client::{GemiusClient, RetryPolicy};

use crate::dataset::DatasetKind;
use crate::error::Result;
use crate::extractor::FilterSet;
use crate::period::Period;

/// Source of raw tab-delimited responses.
///
/// Implemented by the HTTP client; tests substitute an in-memory source.
pub trait VendorApi {
    /// Full listing of available periods for every country.
    fn available_periods(&self) -> Result<String>;

    /// One dataset response for a period and country. `filters` is empty for
    /// everything but stats.
    fn fetch_dataset(
        &self,
        kind: DatasetKind,
        period: &Period,
        country: &str,
        filters: &FilterSet,
    ) -> Result<String>;

    /// The metrics listing for a period. The listing is not country specific.
    fn fetch_metrics(&self, period: &Period) -> Result<String>;
}

impl<T: VendorApi + ?Sized> VendorApi for &T {
    fn available_periods(&self) -> Result<String> {
        (**self).available_periods()
    }

    fn fetch_dataset(
        &self,
        kind: DatasetKind,
        period: &Period,
        country: &str,
        filters: &FilterSet,
    ) -> Result<String> {
        (**self).fetch_dataset(kind, period, country, filters)
    }

    fn fetch_metrics(&self, period: &Period) -> Result<String> {
        (**self).fetch_metrics(period)
    }
}
