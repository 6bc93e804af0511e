//! Configuration management for powledger

use crate::blockchain::{check_difficulty, Sealing, DEFAULT_DIFFICULTY};
use crate::error::{ChainError, Result};
use crate::miner::DEFAULT_PROGRESS_INTERVAL;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "powledger.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_proof_of_work")]
    pub proof_of_work: bool,
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            proof_of_work: default_proof_of_work(),
            difficulty: default_difficulty(),
        }
    }
}

impl ChainConfig {
    pub fn sealing(&self) -> Sealing {
        if self.proof_of_work {
            Sealing::ProofOfWork {
                difficulty: self.difficulty,
            }
        } else {
            Sealing::Direct
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Unset means mine until a hash is found.
    #[serde(default)]
    pub max_iterations: Option<u64>,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            max_iterations: None,
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_proof_of_work() -> bool {
    true
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

fn default_progress_interval() -> u64 {
    DEFAULT_PROGRESS_INTERVAL
}

impl Config {
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_difficulty(self.chain.difficulty)
            .map_err(|e| ChainError::ConfigError(format!("chain.difficulty: {}", e)))?;

        if self.miner.max_iterations == Some(0) {
            return Err(ChainError::ConfigError(
                "miner.max_iterations must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load configuration from `path`, falling back to defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    match fs::read_to_string(path.as_ref()) {
        Ok(config_str) => Config::from_toml_str(&config_str),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("missing.toml")).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.chain.sealing(), Sealing::ProofOfWork { difficulty: 2 });
        assert_eq!(config.miner.max_iterations, None);
        assert_eq!(config.miner.progress_interval, DEFAULT_PROGRESS_INTERVAL);
    }

    #[test]
    fn test_load_overrides_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[chain]\ndifficulty = 3\n\n[miner]\nmax_iterations = 5000\nprogress_interval = 0"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert!(config.chain.proof_of_work);
        assert_eq!(config.chain.difficulty, 3);
        assert_eq!(config.miner.max_iterations, Some(5000));
        assert_eq!(config.miner.progress_interval, 0);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::from_toml_str("[chain]\nproof_of_work = false\n").unwrap();
        assert_eq!(config.chain.sealing(), Sealing::Direct);
        assert_eq!(config.miner, MinerConfig::default());
    }

    #[test]
    fn test_rejects_difficulty_above_cap() {
        let result = Config::from_toml_str("[chain]\ndifficulty = 65\n");
        match result {
            Err(ChainError::ConfigError(msg)) => assert!(msg.contains("chain.difficulty")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_zero_budget() {
        let result = Config::from_toml_str("[miner]\nmax_iterations = 0\n");
        assert!(matches!(result, Err(ChainError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let result = Config::from_toml_str("[chain\ndifficulty = ");
        assert!(matches!(result, Err(ChainError::ConfigError(_))));
    }
}
