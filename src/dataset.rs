use crate::error::ExtractorError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PRIMARY_KEY: &[&str] = &["id", "country", "begin_period", "end_period", "period_type"];
pub const STATS_PRIMARY_KEY: &[&str] = &[
    "geo_id",
    "node_id",
    "platform_id",
    "target_group",
    "begin_period",
    "end_period",
    "period_type",
];

/// Vendor dataset (API endpoint) that can be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum DatasetKind {
    Stats,
    Geos,
    Nodes,
    Platforms,
    Metrics,
    Trees,
    Demography,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 7] = [
        DatasetKind::Stats,
        DatasetKind::Geos,
        DatasetKind::Nodes,
        DatasetKind::Platforms,
        DatasetKind::Metrics,
        DatasetKind::Trees,
        DatasetKind::Demography,
    ];

    pub fn endpoint(&self) -> &'static str {
        match self {
            DatasetKind::Stats => "stats",
            DatasetKind::Geos => "geos",
            DatasetKind::Nodes => "nodes",
            DatasetKind::Platforms => "platforms",
            DatasetKind::Metrics => "metrics",
            DatasetKind::Trees => "trees",
            DatasetKind::Demography => "demography",
        }
    }

    pub fn primary_key(&self) -> Vec<String> {
        let mut key: Vec<String> = match self {
            DatasetKind::Stats => return STATS_PRIMARY_KEY.iter().map(|c| c.to_string()).collect(),
            _ => DEFAULT_PRIMARY_KEY.iter().map(|c| c.to_string()).collect(),
        };
        if matches!(self, DatasetKind::Nodes | DatasetKind::Geos | DatasetKind::Platforms) {
            key.push("parent_id".to_string());
        }
        key
    }

    pub fn accepts_filters(&self) -> bool {
        matches!(self, DatasetKind::Stats)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.endpoint() == name)
    }
}

impl TryFrom<String> for DatasetKind {
    type Error = ExtractorError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::from_name(name.trim()).ok_or(ExtractorError::UnsupportedDataset { name })
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Query parameter of the stats endpoint that accepts a list of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterParam {
    Geo,
    Platform,
    Node,
    Metric,
    Target,
}

impl FilterParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterParam::Geo => "geo",
            FilterParam::Platform => "platform",
            FilterParam::Node => "node",
            FilterParam::Metric => "metric",
            FilterParam::Target => "target",
        }
    }
}

impl fmt::Display for FilterParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_keys() {
        assert_eq!(
            DatasetKind::Geos.primary_key(),
            vec!["id", "country", "begin_period", "end_period", "period_type", "parent_id"]
        );
        assert_eq!(
            DatasetKind::Trees.primary_key(),
            vec!["id", "country", "begin_period", "end_period", "period_type"]
        );
        assert_eq!(DatasetKind::Stats.primary_key()[0], "geo_id");
        assert_eq!(DatasetKind::Stats.primary_key().len(), 7);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(DatasetKind::from_name("demography"), Some(DatasetKind::Demography));
        assert_eq!(DatasetKind::from_name("available-periods"), None);

        let err = DatasetKind::try_from("audiences".to_string()).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "Unsupported dataset: audiences");
    }

    #[test]
    fn test_only_stats_accepts_filters() {
        let accepting: Vec<_> = DatasetKind::ALL
            .into_iter()
            .filter(DatasetKind::accepts_filters)
            .collect();
        assert_eq!(accepting, vec![DatasetKind::Stats]);
    }
}
