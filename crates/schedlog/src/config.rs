// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Engine configuration
//!
//! ```yaml
//! workers: 8        # parallel per-file reads within one load
//! strict: true      # fail the whole load on the first unreadable file
//! csv:
//!   delimiter: ","
//!   null_token: "-"
//!   batch_size: 8192
//!   extension: csv
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Options for decoding the tabular exports
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CsvOptions {
    /// Field delimiter (default: ',')
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Reserved missing-value marker (default: "-"); blank fields are missing too
    #[serde(default = "default_null_token")]
    pub null_token: String,

    /// Number of records per decoded batch (default: 8192)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Export file extension, without the dot (default: "csv")
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_delimiter() -> char {
    ','
}
fn default_null_token() -> String {
    "-".to_string()
}
fn default_batch_size() -> usize {
    8192
}
fn default_extension() -> String {
    "csv".to_string()
}
fn default_workers() -> usize {
    4
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            null_token: default_null_token(),
            batch_size: default_batch_size(),
            extension: default_extension(),
        }
    }
}

/// Configuration shared by catalog builds, views and aggregations
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on concurrent per-file reads in one load
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Strict mode: one unreadable file fails the load. Otherwise the file
    /// contributes no rows and is listed in the load report.
    #[serde(default)]
    pub strict: bool,

    #[serde(default)]
    pub csv: CsvOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            strict: false,
            csv: CsvOptions::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Worker count actually used; never zero
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.workers, 4);
        assert!(!config.strict);
        assert_eq!(config.csv.delimiter, ',');
        assert_eq!(config.csv.null_token, "-");
        assert_eq!(config.csv.batch_size, 8192);
        assert_eq!(config.csv.extension, "csv");
    }

    #[test]
    fn test_yaml_partial() -> Result<()> {
        let config = EngineConfig::from_yaml_str("workers: 8\nstrict: true\ncsv:\n  delimiter: ';'\n")?;
        assert_eq!(config.workers, 8);
        assert!(config.strict);
        assert_eq!(config.csv.delimiter, ';');
        assert_eq!(config.csv.null_token, "-");
        Ok(())
    }

    #[test]
    fn test_yaml_rejects_unknown_fields() {
        let err = EngineConfig::from_yaml_str("workerz: 8\n");
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_effective_workers() {
        assert_eq!(EngineConfig::default().with_workers(0).effective_workers(), 1);
        assert_eq!(EngineConfig::default().with_workers(6).effective_workers(), 6);
    }

    #[test]
    fn test_yaml_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "strict: true\n")?;
        let config = EngineConfig::from_yaml_file(&path)?;
        assert!(config.strict);
        assert_eq!(config.workers, 4);
        Ok(())
    }
}
