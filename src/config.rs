// ⚙️ Configuration - TOML file, every section optional
//
// Defaults match the stock workbook layout (English headers, three revenue
// sources, SOURCE_A/SOURCE_B affiliations). Real deployments override the
// header texts and aliases.

use crate::affiliation::{Affiliation, AffiliationVocabulary};
use crate::error::{Result, SettlementError};
use crate::ledger::{LedgerColumns, LedgerParser};
use crate::reconciliation::ReconciliationEngine;
use crate::retry::RetryPolicy;
use crate::sources::SourceSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one sub-directory per workbook
    pub root: PathBuf,
    pub ledger_workbook: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            root: PathBuf::from("data"),
            ledger_workbook: "cost_ledger".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub path: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        JournalConfig {
            path: PathBuf::from("settlement_journal.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Settlement documents and reconciliation reports land here
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            dir: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub tolerance: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        ReconciliationConfig { tolerance: 0.001 }
    }
}

/// Extra ledger tokens accepted per affiliation, on top of the canonical
/// SOURCE_A / SOURCE_B tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffiliationAliases {
    pub source_a: Vec<String>,
    pub source_b: Vec<String>,
}

impl Default for AffiliationAliases {
    fn default() -> Self {
        AffiliationAliases {
            source_a: vec!["A".to_string()],
            source_b: vec!["B".to_string()],
        }
    }
}

impl AffiliationAliases {
    pub fn vocabulary(&self) -> AffiliationVocabulary {
        let mut aliases = BTreeMap::new();
        aliases.insert(Affiliation::SourceA, self.source_a.clone());
        aliases.insert(Affiliation::SourceB, self.source_b.clone());
        AffiliationVocabulary::new(aliases)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub journal: JournalConfig,
    pub output: OutputConfig,
    pub retry: RetryPolicy,
    pub reconciliation: ReconciliationConfig,
    pub ledger_columns: LedgerColumns,
    pub affiliations: AffiliationAliases,
    pub sources: Vec<SourceSchema>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig::default(),
            journal: JournalConfig::default(),
            output: OutputConfig::default(),
            retry: RetryPolicy::default(),
            reconciliation: ReconciliationConfig::default(),
            ledger_columns: LedgerColumns::default(),
            affiliations: AffiliationAliases::default(),
            sources: SourceSchema::defaults(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|e| match e {
            SettlementError::Config(msg) => {
                SettlementError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| SettlementError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(SettlementError::Config(
                "at least one [[sources]] entry is required".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(SettlementError::Config(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(SettlementError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        let tolerance = self.reconciliation.tolerance;
        if tolerance.is_nan() || tolerance < 0.0 {
            return Err(SettlementError::Config(format!(
                "reconciliation.tolerance must be non-negative, got {}",
                tolerance
            )));
        }

        Ok(())
    }

    pub fn ledger_parser(&self) -> LedgerParser {
        LedgerParser::new(self.ledger_columns.clone(), self.affiliations.vocabulary())
    }

    pub fn reconciliation_engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::with_tolerance(self.reconciliation.tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.store.ledger_workbook, "cost_ledger");
        assert_eq!(config.reconciliation.tolerance, 0.001);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml(
            r#"
            [store]
            root = "/srv/workbooks"

            [ledger_columns]
            artist = "아티스트명"

            [affiliations]
            source_a = ["A", "레이블A"]

            [retry]
            max_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.store.root, PathBuf::from("/srv/workbooks"));
        assert_eq!(config.store.ledger_workbook, "cost_ledger");
        assert_eq!(config.ledger_columns.artist, "아티스트명");
        assert_eq!(config.ledger_columns.rate, "SettlementRate");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 2000);

        let vocabulary = config.affiliations.vocabulary();
        assert_eq!(vocabulary.resolve("레이블A"), Some(Affiliation::SourceA));
        assert_eq!(vocabulary.resolve("source_b"), Some(Affiliation::SourceB));
    }

    #[test]
    fn test_sources_table_replaces_defaults() {
        let config = Config::from_toml(
            r#"
            [[sources]]
            id = "only"
            workbook = "only_revenue"
            affiliation = "SourceB"
            artist_column = "Artist"
            amount_column = "Amount"
            "#,
        )
        .unwrap();

        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].affiliation, Affiliation::SourceB);
        assert!(config.sources[0].fields.is_empty());
    }

    #[test]
    fn test_validation_failures() {
        let dup = r#"
            [[sources]]
            id = "x"
            workbook = "w1"
            affiliation = "SourceA"
            artist_column = "a"
            amount_column = "b"

            [[sources]]
            id = "x"
            workbook = "w2"
            affiliation = "SourceB"
            artist_column = "a"
            amount_column = "b"
        "#;
        assert!(matches!(Config::from_toml(dup), Err(SettlementError::Config(_))));

        let zero_attempts = "[retry]\nmax_attempts = 0\n";
        assert!(Config::from_toml(zero_attempts).is_err());

        let negative = "[reconciliation]\ntolerance = -1.0\n";
        assert!(Config::from_toml(negative).is_err());

        let mut empty = Config::default();
        empty.sources.clear();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::from_toml(include_str!("../config/settle.example.toml")).unwrap();
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.ledger_columns.artist, "아티스트명");
        assert_eq!(config.sources[2].fields[3].field, "track_id");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settle.toml");
        std::fs::write(&path, "[output]\ndir = \"reports\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.output.dir, PathBuf::from("reports"));

        let missing = Config::load(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(SettlementError::Io(_))));
    }
}
