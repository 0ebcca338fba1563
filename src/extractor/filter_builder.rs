use crate::config::{Config, FilterSpec};
use crate::dataset::FilterParam;
use crate::error::{ExtractorError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolved stats filters: parameter name to the values sent for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    params: BTreeMap<FilterParam, Vec<String>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any earlier values for `param`.
    pub fn insert(&mut self, param: FilterParam, values: Vec<String>) {
        self.params.insert(param, values);
    }

    pub fn get(&self, param: FilterParam) -> Option<&[String]> {
        self.params.get(&param).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// One `(name, value)` pair per value, so list parameters repeat their key.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .flat_map(|(param, values)| {
                values
                    .iter()
                    .map(move |value| (param.as_str().to_string(), value.clone()))
            })
            .collect()
    }

    /// Compact JSON with keys in alphabetical order, e.g. `{"metric":["ru"],"node":["1"]}`.
    pub fn describe(&self) -> String {
        let sorted: BTreeMap<&str, &Vec<String>> = self
            .params
            .iter()
            .map(|(param, values)| (param.as_str(), values))
            .collect();
        serde_json::to_string(&sorted).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Finds the file behind an input table name.
pub trait TableResolver {
    fn resolve_table(&self, name: &str) -> Result<PathBuf>;
}

impl TableResolver for Config {
    fn resolve_table(&self, name: &str) -> Result<PathBuf> {
        self.input_table_path(name)
    }
}

/// Resolves every spec into a [`FilterSet`]. A later spec for the same parameter wins.
pub fn build_filters<R: TableResolver + ?Sized>(specs: &[FilterSpec], tables: &R) -> Result<FilterSet> {
    let mut filters = FilterSet::new();

    for spec in specs {
        let source = spec.source.trim();
        let values = if source.starts_with('[') {
            parse_literal_list(source).map_err(|message| ExtractorError::InvalidFilter {
                filter: spec.filter.to_string(),
                message,
            })?
        } else {
            let path = tables.resolve_table(source)?;
            if !path.exists() {
                return Err(ExtractorError::TableNotFound {
                    name: source.to_string(),
                });
            }
            read_first_column(&path)?
        };

        debug!(filter = %spec.filter, values = values.len(), "resolved filter");
        filters.insert(spec.filter, values);
    }

    Ok(filters)
}

/// Parses `['a', "b", 3]`: quoted strings or bare scalars, comma separated.
pub fn parse_literal_list(source: &str) -> std::result::Result<Vec<String>, String> {
    let inner = source
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| format!("'{}' is not a bracketed list", source))?;

    let mut values = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        let first = match chars.peek() {
            Some(&c) => c,
            None => break,
        };

        if first == '\'' || first == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    c if c == first => {
                        closed = true;
                        break;
                    }
                    c => value.push(c),
                }
            }
            if !closed {
                return Err(format!("unterminated string in {}", source));
            }
            values.push(value);
        } else {
            let mut value = String::new();
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            let value = value.trim();
            if value.is_empty() {
                return Err(format!("empty element in {}", source));
            }
            if value.contains(['\'', '"', '[', ']']) {
                return Err(format!("unexpected character in element '{}'", value));
            }
            values.push(value.to_string());
        }

        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            Some(',') | None => {}
            Some(other) => return Err(format!("expected ',' but found '{}' in {}", other, source)),
        }
    }

    Ok(values)
}

/// First column of every data row; the header row is skipped.
fn read_first_column(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(0).map(str::trim).filter(|v| !v.is_empty()) {
            values.push(value.to_string());
        }
    }
    Ok(values)
}
