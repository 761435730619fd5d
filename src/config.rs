// ⚙️ Application Configuration
//
// Resolution order (highest priority first):
// 1. CLI flags (applied via `apply_cli_overrides`)
// 2. Environment variables (`RISK_SCORER_*`)
// 3. TOML file (`--config <path>`, or `risk-scorer.toml` in the working directory)
// 4. Compiled defaults

use crate::error::{Result, RiskError};
use crate::progress::DEFAULT_PROGRESS_INTERVAL;
use crate::query_risk::QueryRiskCriteria;
use crate::service::{FailurePolicy, DEFAULT_LENS_ID};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "risk-scorer.toml";
pub const ENV_PREFIX: &str = "RISK_SCORER_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database holding RES_RISK_SCORE and RES_FEAT_EKEY
    pub database: PathBuf,

    /// Directory of `<entity_id>.json` resolved-entity snapshots
    pub entity_dir: PathBuf,

    /// Engine configuration export (G2_CONFIG with CFG_FTYPE / CFG_FBOVR)
    pub engine_config: PathBuf,

    pub lens_id: i64,

    /// Comma-separated data source codes, e.g. "IMDM,WATCHLIST"
    pub trusted_sources: String,

    /// `<pattern>:<R|Y>;...`, e.g. "+NAME+DOB:R;+NAME+ADDRESS:Y"
    pub query_risk_criteria: String,

    pub collaborator_failure: FailurePolicy,

    /// Entities between progress reports, 0 disables them
    pub progress_interval: u64,

    pub workers: usize,

    /// Listen address of the HTTP server
    pub bind: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database: PathBuf::from("risk-scores.db"),
            entity_dir: PathBuf::from("entities"),
            engine_config: PathBuf::from("g2config.json"),
            lens_id: DEFAULT_LENS_ID,
            trusted_sources: String::new(),
            query_risk_criteria: String::new(),
            collaborator_failure: FailurePolicy::Abort,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            workers: 1,
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Values given on the command line; `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub database: Option<PathBuf>,
    pub entity_dir: Option<PathBuf>,
    pub engine_config: Option<PathBuf>,
    pub lens_id: Option<i64>,
    pub trusted_sources: Option<String>,
    pub query_risk_criteria: Option<String>,
    pub collaborator_failure: Option<FailurePolicy>,
    pub workers: Option<usize>,
    pub bind: Option<String>,
}

impl AppConfig {
    /// Resolve all layers and validate the result.
    ///
    /// An explicit `config_path` must exist; the default file is optional.
    pub fn load(config_path: Option<&Path>, cli: Option<&CliOverrides>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_toml_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_toml_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env_overrides()?;

        if let Some(cli) = cli {
            config.apply_cli_overrides(cli);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| RiskError::config(format!("Invalid configuration: {}", e)))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RiskError::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Loaded configuration file");
        toml::from_str(&content)
            .map_err(|e| RiskError::config(format!("Invalid config {}: {}", path.display(), e)))
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `RISK_SCORER_*` values obtained through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("DATABASE") {
            self.database = PathBuf::from(v);
        }
        if let Some(v) = var("ENTITY_DIR") {
            self.entity_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ENGINE_CONFIG") {
            self.engine_config = PathBuf::from(v);
        }
        if let Some(v) = var("LENS_ID") {
            self.lens_id = parse_number("LENS_ID", &v)?;
        }
        if let Some(v) = var("TRUSTED_SOURCES") {
            self.trusted_sources = v;
        }
        if let Some(v) = var("QUERY_RISK_CRITERIA") {
            self.query_risk_criteria = v;
        }
        if let Some(v) = var("COLLABORATOR_FAILURE") {
            self.collaborator_failure = v.parse()?;
        }
        if let Some(v) = var("PROGRESS_INTERVAL") {
            self.progress_interval = parse_number("PROGRESS_INTERVAL", &v)?;
        }
        if let Some(v) = var("WORKERS") {
            self.workers = parse_number("WORKERS", &v)?;
        }
        if let Some(v) = var("BIND") {
            self.bind = v;
        }

        Ok(())
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(v) = &cli.database {
            self.database = v.clone();
        }
        if let Some(v) = &cli.entity_dir {
            self.entity_dir = v.clone();
        }
        if let Some(v) = &cli.engine_config {
            self.engine_config = v.clone();
        }
        if let Some(v) = cli.lens_id {
            self.lens_id = v;
        }
        if let Some(v) = &cli.trusted_sources {
            self.trusted_sources = v.clone();
        }
        if let Some(v) = &cli.query_risk_criteria {
            self.query_risk_criteria = v.clone();
        }
        if let Some(v) = cli.collaborator_failure {
            self.collaborator_failure = v;
        }
        if let Some(v) = cli.workers {
            self.workers = v;
        }
        if let Some(v) = &cli.bind {
            self.bind = v.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.lens_id <= 0 {
            return Err(RiskError::config("lens_id must be greater than 0"));
        }
        if self.workers == 0 {
            return Err(RiskError::config("workers must be at least 1"));
        }
        if self.bind.parse::<SocketAddr>().is_err() {
            return Err(RiskError::config(format!(
                "bind must be a socket address, got {}",
                self.bind
            )));
        }
        QueryRiskCriteria::parse(&self.query_risk_criteria)?;
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        RiskError::config(format!("{}{} is not a valid number: {}", ENV_PREFIX, name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.lens_id, 1);
        assert_eq!(config.progress_interval, 1000);
        assert_eq!(config.collaborator_failure, FailurePolicy::Abort);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            trusted_sources = "IMDM,WATCHLIST"
            query_risk_criteria = "+NAME+DOB:R;+NAME+ADDRESS:Y"
            collaborator_failure = "skip"
            "#,
        )
        .unwrap();

        assert_eq!(config.trusted_sources, "IMDM,WATCHLIST");
        assert_eq!(config.collaborator_failure, FailurePolicy::Skip);
        assert_eq!(config.database, PathBuf::from("risk-scores.db"));
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("workers = \"many\"").unwrap_err();
        assert!(matches!(err, RiskError::Config(_)));
    }

    #[test]
    fn test_env_overrides_file_and_cli_overrides_env() {
        let mut config = AppConfig::from_toml("lens_id = 2\nworkers = 2").unwrap();
        let env: HashMap<&str, &str> = [
            ("RISK_SCORER_LENS_ID", "3"),
            ("RISK_SCORER_TRUSTED_SOURCES", "IMDM"),
            ("RISK_SCORER_COLLABORATOR_FAILURE", "skip"),
        ]
        .into_iter()
        .collect();

        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.lens_id, 3);
        assert_eq!(config.workers, 2);
        assert_eq!(config.trusted_sources, "IMDM");

        config.apply_cli_overrides(&CliOverrides {
            lens_id: Some(4),
            workers: Some(8),
            ..Default::default()
        });
        assert_eq!(config.lens_id, 4);
        assert_eq!(config.workers, 8);
        assert_eq!(config.collaborator_failure, FailurePolicy::Skip);
    }

    #[test]
    fn test_bad_env_number_is_fatal() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_from(|key| (key == "RISK_SCORER_WORKERS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, RiskError::Config(_)));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AppConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.bind = "localhost".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.query_risk_criteria = "+NAME+DOB:Z".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scorer.toml");
        std::fs::write(&path, "database = \"/tmp/scores.db\"\nprogress_interval = 50\n").unwrap();

        let config = AppConfig::load(
            Some(&path),
            Some(&CliOverrides {
                bind: Some("0.0.0.0:8080".to_string()),
                ..Default::default()
            }),
        )
        .unwrap();

        assert_eq!(config.database, PathBuf::from("/tmp/scores.db"));
        assert_eq!(config.progress_interval, 50);
        assert_eq!(config.bind, "0.0.0.0:8080");

        assert!(AppConfig::load(Some(&dir.path().join("missing.toml")), None).is_err());
    }
}
