//! Harness configuration stored under `.harness/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Harness configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    /// How many scenario instances run concurrently; further instances wait
    /// in declaration order.
    pub max_active_instances: usize,

    /// Persisted items whose serialized size exceeds this are split into
    /// chunks transparently.
    pub chunk_threshold_bytes: usize,

    /// Party name acting as the release requester.
    pub requester_party: String,

    /// Party name acting as the document custodian.
    pub custodian_party: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_active_instances: 4,
            chunk_threshold_bytes: 128 * 1024,
            requester_party: "Requester1".to_string(),
            custodian_party: "Custodian1".to_string(),
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_active_instances == 0 {
            return Err(anyhow!("max_active_instances must be > 0"));
        }
        if self.chunk_threshold_bytes == 0 {
            return Err(anyhow!("chunk_threshold_bytes must be > 0"));
        }
        if self.requester_party.trim().is_empty() || self.custodian_party.trim().is_empty() {
            return Err(anyhow!("party names must be non-empty"));
        }
        if self.requester_party == self.custodian_party {
            return Err(anyhow!("requester_party and custodian_party must differ"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HarnessConfig::default()`.
pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    if !path.exists() {
        let cfg = HarnessConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HarnessConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &HarnessConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, HarnessConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = HarnessConfig {
            max_active_instances: 2,
            ..HarnessConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn identical_party_names_are_rejected() {
        let cfg = HarnessConfig {
            custodian_party: "Requester1".to_string(),
            ..HarnessConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
