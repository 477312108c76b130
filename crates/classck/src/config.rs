//! Checker settings.
//!
//! Read from TOML. Every field has a default, so an empty file (or no file)
//! runs every check and keeps going after errors.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::consistency::FunDepChecks;
use crate::select::SelectOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse checker config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Checker settings, read from a `classck.toml` file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckConfig {
    /// Stop after the first stage that reports an error.
    pub halt_on_error: bool,
    pub checks: Checks,
    /// Warn about local abstract instances declared more than once.
    pub warn_duplicate_abstract: bool,
}

/// The `[checks]` table: individual passes that can be switched off.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Checks {
    pub coverage: bool,
    pub consistency: bool,
    pub ambiguity: bool,
    pub overlap_assertion: bool,
}

impl Default for Checks {
    fn default() -> Self {
        Checks { coverage: true, consistency: true, ambiguity: true, overlap_assertion: true }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        CheckConfig { halt_on_error: false, checks: Checks::default(), warn_duplicate_abstract: true }
    }
}

impl CheckConfig {
    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<CheckConfig, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_str(&content)
    }

    /// Parse a config from TOML text.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<CheckConfig, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn select_options(&self) -> SelectOptions {
        SelectOptions {
            warn_duplicate_abstract: self.warn_duplicate_abstract,
            overlap_assertion: self.checks.overlap_assertion,
        }
    }

    pub fn fundep_checks(&self) -> FunDepChecks {
        FunDepChecks { coverage: self.checks.coverage, consistency: self.checks.consistency }
    }
}
