//! Driver configuration
//!
//! Loaded in layers: built-in defaults, then an optional TOML file, then
//! `HAP_`-prefixed environment variables (e.g. `HAP_PORT=51827`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use hap_runtime::SchedulerConfig;
use hap_types::Category;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration of an accessory server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Name announced on the network
    pub name: String,

    /// Address the transport listens on
    pub address: String,

    pub port: u16,

    /// Where identity and pairing state is persisted
    pub persist_file: PathBuf,

    /// Fixed setup code for newly generated identities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,

    /// Fixed server identifier for newly generated identities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,

    /// Worker threads available to blocking jobs
    pub worker_threads: usize,

    /// How long stopping waits for in-flight jobs
    pub shutdown_timeout_ms: u64,

    /// Category used when the registry is empty
    pub category: Category,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: "HAP Accessory".to_string(),
            address: "0.0.0.0".to_string(),
            port: 51826,
            persist_file: PathBuf::from("accessory.state"),
            pincode: None,
            mac: None,
            worker_threads: 8,
            shutdown_timeout_ms: 5000,
            category: Category::Other,
        }
    }
}

impl DriverConfig {
    /// Load configuration from defaults, an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(DriverConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config: DriverConfig = figment.merge(Env::prefixed("HAP_")).extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Check field values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid("worker_threads must be at least 1".into()));
        }
        if let Some(pincode) = &self.pincode {
            if !is_pincode(pincode) {
                return Err(ConfigError::Invalid(format!(
                    "pincode '{pincode}' must look like 123-45-678"
                )));
            }
        }
        if let Some(mac) = &self.mac {
            if !is_mac(mac) {
                return Err(ConfigError::Invalid(format!(
                    "mac '{mac}' must look like AA:BB:CC:DD:EE:FF"
                )));
            }
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            worker_threads: self.worker_threads,
            shutdown_timeout: self.shutdown_timeout(),
        }
    }
}

fn is_pincode(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    groups.iter().map(|g| g.len()).eq([3, 2, 3])
        && groups.iter().all(|g| g.chars().all(|c| c.is_ascii_digit()))
}

fn is_mac(s: &str) -> bool {
    let groups: Vec<&str> = s.split(':').collect();
    groups.len() == 6
        && groups
            .iter()
            .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.port, 51826);
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hap.toml");
        std::fs::write(
            &path,
            r#"
name = "Garage Bridge"
port = 51900
pincode = "031-45-154"
category = "bridge"
"#,
        )
        .unwrap();

        let config = DriverConfig::load(Some(&path)).unwrap();
        assert_eq!(config.name, "Garage Bridge");
        assert_eq!(config.port, 51900);
        assert_eq!(config.pincode.as_deref(), Some("031-45-154"));
        assert_eq!(config.category, Category::Bridge);
        assert_eq!(config.persist_file, PathBuf::from("accessory.state"));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hap.toml");
        std::fs::write(&path, "worker_threads = 0\n").unwrap();

        assert!(matches!(
            DriverConfig::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_identity_shapes() {
        let mut config = DriverConfig {
            pincode: Some("12345678".into()),
            ..DriverConfig::default()
        };
        assert!(config.validate().is_err());

        config.pincode = Some("123-45-678".into());
        config.mac = Some("AA:BB:CC:DD:EE".into());
        assert!(config.validate().is_err());

        config.mac = Some("aa:BB:0c:DD:EE:01".into());
        assert!(config.validate().is_ok());
    }
}
