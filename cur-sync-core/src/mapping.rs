//! Destination mapper: where each report part lands in the destination bucket.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SyncError};
use crate::keys::basename;
use crate::manifest::Manifest;

/// Destination folder layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathScheme {
    /// `accountid=<account>/billingperiod=<yyyy-MM-dd>`
    #[default]
    BillingPeriod,
    /// `accountid=<account>/year=<yyyy>/month=<m>`
    YearMonth,
}

impl From<&str> for PathScheme {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "billingperiod" | "" => PathScheme::BillingPeriod,
            "yearmonth" => PathScheme::YearMonth,
            other => {
                tracing::warn!(
                    format = other,
                    "Unknown output path format, defaulting to billingperiod"
                );
                PathScheme::BillingPeriod
            }
        }
    }
}

impl PathScheme {
    /// Destination folder (no trailing slash) for a manifest.
    pub fn prefix(&self, manifest: &Manifest) -> String {
        let period = &manifest.billing_period;
        match self {
            PathScheme::BillingPeriod => format!(
                "accountid={}/billingperiod={}",
                manifest.account,
                period.start_date()
            ),
            PathScheme::YearMonth => format!(
                "accountid={}/year={}/month={}",
                manifest.account,
                period.start_year(),
                period.start_month()
            ),
        }
    }
}

/// Ordered source → destination key mapping for one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMapping {
    prefix: String,
    entries: Vec<(String, String)>,
}

impl KeyMapping {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn destination_keys(&self) -> HashSet<String> {
        self.entries.iter().map(|(_, d)| d.clone()).collect()
    }
}

/// Build the mapping for every report key in the manifest, keeping manifest order.
///
/// Repeated source keys collapse to their first occurrence. Two different source
/// keys that land on the same destination key fail with [`SyncError::Validation`].
pub fn destination_mapping(manifest: &Manifest, scheme: PathScheme) -> Result<KeyMapping> {
    let prefix = scheme.prefix(manifest);
    let mut seen = HashSet::new();
    let mut destinations: HashMap<String, &str> = HashMap::new();
    let mut entries = Vec::with_capacity(manifest.report_keys.len());

    for key in manifest.report_keys.iter().filter(|k| seen.insert(k.as_str())) {
        let destination = format!("{prefix}/{}", basename(key));
        if let Some(previous) = destinations.insert(destination.clone(), key.as_str()) {
            return Err(SyncError::Validation(format!(
                "report keys {previous} and {key} both map to {destination}"
            )));
        }
        entries.push((key.clone(), destination));
    }

    Ok(KeyMapping { prefix, entries })
}
