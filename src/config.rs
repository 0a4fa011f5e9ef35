//! File-based configuration for the bearerbox binary: core process
//! settings, the SMSC connector list, box listener address, and access
//! lists, loaded from a TOML file via `serde`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BearerboxError;

/// Top-level `[core]` section: process-wide settings with no natural home
/// elsewhere.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoreConfig {
    pub store_path: String,
    pub box_listen: String,
    pub wtp_port: u16,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One `[[smsc]]` entry describing a connector to create at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmscEntry {
    pub id: String,
    pub dialect: String,
    #[serde(default)]
    pub allowed_prefixes: Vec<String>,
    #[serde(default)]
    pub denied_prefixes: Vec<String>,
    #[serde(default)]
    pub preferred_prefixes: Vec<String>,
    #[serde(default)]
    pub preferred_smsc_ids: Vec<String>,
    #[serde(default)]
    pub denied_smsc_ids: Vec<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Top-level `[access]` section applied uniformly to every inbound message.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub white_list: Vec<String>,
    #[serde(default)]
    pub black_list: Vec<String>,
}

/// The full on-disk configuration tree for a bearerbox instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BearerboxConfig {
    pub core: CoreConfig,
    #[serde(default)]
    pub smsc: Vec<SmscEntry>,
    #[serde(default)]
    pub access: AccessConfig,
}

impl BearerboxConfig {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BearerboxError> {
        let raw = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| BearerboxError::Config(format!("reading {:?}: {e}", path.as_ref())))?;
        toml::from_str(&raw).map_err(|e| BearerboxError::Config(format!("parsing config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml_src = r#"
            [core]
            store_path = "/var/lib/bearerbox/store.log"
            box_listen = "0.0.0.0:13000"
            wtp_port = 9200

            [[smsc]]
            id = "smsc-1"
            dialect = "mock"
            allowed_prefixes = ["44"]
        "#;
        let cfg: BearerboxConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.core.wtp_port, 9200);
        assert_eq!(cfg.smsc.len(), 1);
        assert_eq!(cfg.smsc[0].id, "smsc-1");
        assert_eq!(cfg.core.log_level, "info");
        assert!(cfg.smsc[0].preferred_smsc_ids.is_empty());
        assert!(cfg.smsc[0].denied_smsc_ids.is_empty());
    }

    #[test]
    fn parses_smsc_id_selectors() {
        let toml_src = r#"
            [core]
            store_path = "/var/lib/bearerbox/store.log"
            box_listen = "0.0.0.0:13000"
            wtp_port = 9200

            [[smsc]]
            id = "smsc-1"
            dialect = "mock"
            preferred_smsc_ids = ["smsc-1"]
            denied_smsc_ids = ["smsc-2"]
        "#;
        let cfg: BearerboxConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.smsc[0].preferred_smsc_ids, vec!["smsc-1".to_string()]);
        assert_eq!(cfg.smsc[0].denied_smsc_ids, vec!["smsc-2".to_string()]);
    }
}
