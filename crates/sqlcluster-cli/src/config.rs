use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlcluster_distributed::ClusterConfig;
use std::path::Path;

/// CLI settings, read from the `--config` JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workers: usize,
    pub show_timing: bool,
    pub max_rows: usize,
    pub output_format: OutputFormat,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 2,
            show_timing: true,
            max_rows: 1000,
            output_format: OutputFormat::Table,
            cluster: ClusterConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cli.json");
        std::fs::write(
            &path,
            r#"{"workers": 4, "cluster": {"protocol": "TCP", "base_port": 9000}}"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_rows, 1000);
        assert_eq!(config.cluster.protocol, "TCP");
        assert_eq!(config.cluster.base_port, 9000);
        assert_eq!(config.cluster.bind_ip, "0.0.0.0");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cli.json");
        let config = Config {
            output_format: OutputFormat::Csv,
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.output_format, OutputFormat::Csv);
        assert_eq!(loaded.workers, 2);
    }

    #[test]
    fn test_bad_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cli.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::from_file(&path).is_err());
        assert!(Config::from_file(&dir.path().join("missing.json")).is_err());
    }
}
