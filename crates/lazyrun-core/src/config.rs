//! Bridge configuration, read from TOML or assembled from CLI flags.
//!
//! ```toml
//! module = "/opt/scheme/bin/eval"
//! args = ["--quiet"]
//! integrity = "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
//! load_timeout_ms = 5000
//! ```

use crate::error::ConfigError;
use crate::loader::LoadSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const INTEGRITY_PREFIX: &str = "sha256:";
const SHA256_HEX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Location of the runtime module.
    pub module: PathBuf,
    /// Extra arguments passed to the runtime on every evaluation.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub integrity: Option<String>,
    #[serde(default)]
    pub load_timeout_ms: Option<u64>,
}

impl BridgeConfig {
    pub fn new(module: impl Into<PathBuf>) -> Self {
        Self {
            module: module.into(),
            args: Vec::new(),
            integrity: None,
            load_timeout_ms: None,
        }
    }

    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.module.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("module path is empty".to_string()));
        }
        if let Some(integrity) = &self.integrity {
            validate_integrity(integrity)?;
        }
        if self.load_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "load_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load_settings(&self) -> LoadSettings {
        LoadSettings {
            integrity: self.integrity.clone(),
            timeout: self.load_timeout_ms.map(Duration::from_millis),
        }
    }
}

fn validate_integrity(integrity: &str) -> Result<(), ConfigError> {
    let trimmed = integrity.trim();
    let hex = trimmed
        .get(..INTEGRITY_PREFIX.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(INTEGRITY_PREFIX))
        .map(|_| &trimmed[INTEGRITY_PREFIX.len()..])
        .ok_or_else(|| {
            ConfigError::Invalid(format!(
                "integrity must start with `{INTEGRITY_PREFIX}`: {integrity}"
            ))
        })?;
    if hex.len() != SHA256_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::Invalid(format!(
            "integrity digest must be {SHA256_HEX_LEN} hex characters: {integrity}"
        )));
    }
    Ok(())
}
