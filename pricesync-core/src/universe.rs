//! Entity universe and ranking source.
//!
//! The engine does not own the entity list; it consumes an ordered listing
//! plus a separately ordered "top" ranking through the [`EntitySource`]
//! trait. The file-backed implementation reads a TOML config with sectors
//! and an explicit ranked priority list:
//!
//! ```toml
//! priority = ["SPY", "AAPL"]
//!
//! [sectors]
//! Technology = ["AAPL", "MSFT"]
//! ETFs = ["SPY", "QQQ"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read entity listing: {0}")]
    Listing(String),

    #[error("cannot read entity ranking: {0}")]
    Ranking(String),
}

/// External list-and-priority provider: a bulk listing and a ranking query,
/// both plain ordered sequences of entity codes.
pub trait EntitySource: Send + Sync {
    fn list_universe(&self) -> Result<Vec<String>, SourceError>;

    /// The top `limit` codes by the source's externally computed ranking.
    fn top_ranked(&self, limit: usize) -> Result<Vec<String>, SourceError>;
}

/// Sector-organized universe config with a ranked priority list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseConfig {
    #[serde(default)]
    pub priority: Vec<String>,
    pub sectors: BTreeMap<String, Vec<String>>,
}

impl UniverseConfig {
    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Listing(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SourceError> {
        toml::from_str(content).map_err(|e| SourceError::Listing(format!("parse TOML: {e}")))
    }

    /// All codes across all sectors, in sector-name then list order.
    pub fn all_codes(&self) -> Vec<String> {
        self.sectors.values().flatten().cloned().collect()
    }
}

/// [`EntitySource`] backed by a universe config file.
pub struct FileEntitySource {
    config: UniverseConfig,
}

impl FileEntitySource {
    pub fn new(config: UniverseConfig) -> Self {
        Self { config }
    }

    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        Ok(Self::new(UniverseConfig::from_file(path)?))
    }
}

impl EntitySource for FileEntitySource {
    fn list_universe(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.config.all_codes())
    }

    fn top_ranked(&self, limit: usize) -> Result<Vec<String>, SourceError> {
        Ok(self.config.priority.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
priority = ["SPY", "AAPL"]

[sectors]
ETFs = ["SPY", "QQQ"]
Technology = ["AAPL", "MSFT"]
"#;

    #[test]
    fn parses_sectors_and_priority() {
        let config = UniverseConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.priority, vec!["SPY", "AAPL"]);
        assert_eq!(config.all_codes(), vec!["SPY", "QQQ", "AAPL", "MSFT"]);
    }

    #[test]
    fn priority_is_optional() {
        let config = UniverseConfig::from_toml("[sectors]\nETFs = [\"SPY\"]\n").unwrap();
        assert!(config.priority.is_empty());
    }

    #[test]
    fn top_ranked_respects_limit_and_order() {
        let source = FileEntitySource::new(UniverseConfig::from_toml(SAMPLE).unwrap());
        assert_eq!(source.top_ranked(1).unwrap(), vec!["SPY"]);
        assert_eq!(source.top_ranked(10).unwrap(), vec!["SPY", "AAPL"]);
    }

    #[test]
    fn bad_toml_is_a_listing_error() {
        assert!(matches!(
            UniverseConfig::from_toml("not toml ["),
            Err(SourceError::Listing(_))
        ));
    }
}
