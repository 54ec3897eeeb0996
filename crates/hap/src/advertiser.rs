//! Service discovery collaborator
//!
//! The advertiser announces the server on the local network. A driver closes
//! an advertiser it created itself; one supplied from outside is only asked
//! to advertise and withdraw.

use std::collections::BTreeMap;

use async_trait::async_trait;
use hap_types::Category;

use crate::config::DriverConfig;
use crate::state::State;

/// DNS-SD service type of accessory servers
pub const SERVICE_TYPE: &str = "_hap._tcp.local.";

/// Protocol version announced in the `pv` record
const PROTOCOL_VERSION: &str = "1.1";

/// What the advertiser announces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementInfo {
    /// Instance name shown during setup
    pub name: String,
    pub address: String,
    pub port: u16,
    /// TXT records
    pub txt: BTreeMap<String, String>,
}

impl AdvertisementInfo {
    /// Build the announcement for a server identity
    ///
    /// `sf` is `1` while the server is unpaired and discoverable for setup.
    pub fn new(config: &DriverConfig, state: &State, category: Category) -> Self {
        let txt = [
            ("md", config.name.clone()),
            ("pv", PROTOCOL_VERSION.to_string()),
            ("id", state.mac.clone()),
            ("c#", state.config_version.to_string()),
            ("s#", "1".to_string()),
            ("ff", "0".to_string()),
            ("ci", category.id().to_string()),
            ("sf", if state.is_paired() { "0" } else { "1" }.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            name: config.name.clone(),
            address: config.address.clone(),
            port: config.port,
            txt,
        }
    }

    /// Fully qualified instance name
    pub fn instance_name(&self) -> String {
        format!("{}.{}", self.name, SERVICE_TYPE)
    }

    pub fn txt(&self, key: &str) -> Option<&str> {
        self.txt.get(key).map(String::as_str)
    }
}

#[async_trait]
pub trait Advertiser: Send + Sync {
    /// Start announcing the server
    async fn advertise(&self, info: &AdvertisementInfo) -> anyhow::Result<()>;

    /// Refresh the announcement after pairing or configuration changes
    async fn update(&self, info: &AdvertisementInfo) -> anyhow::Result<()>;

    /// Stop announcing the server
    async fn withdraw(&self, info: &AdvertisementInfo) -> anyhow::Result<()>;

    /// Release the advertiser's resources
    async fn close(&self) -> anyhow::Result<()>;
}

/// Advertiser that only logs what it would announce
#[derive(Debug, Default)]
pub struct NullAdvertiser;

#[async_trait]
impl Advertiser for NullAdvertiser {
    async fn advertise(&self, info: &AdvertisementInfo) -> anyhow::Result<()> {
        tracing::info!(
            instance = %info.instance_name(),
            address = %info.address,
            port = info.port,
            txt = ?info.txt,
            "Advertising accessory server"
        );
        Ok(())
    }

    async fn update(&self, info: &AdvertisementInfo) -> anyhow::Result<()> {
        tracing::debug!(instance = %info.instance_name(), txt = ?info.txt, "Advertisement updated");
        Ok(())
    }

    async fn withdraw(&self, info: &AdvertisementInfo) -> anyhow::Result<()> {
        tracing::info!(instance = %info.instance_name(), "Advertisement withdrawn");
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txt_records() {
        let config = DriverConfig {
            name: "Test Bridge".into(),
            ..DriverConfig::default()
        };
        let mut state = State::generate();
        state.config_version = 3;

        let info = AdvertisementInfo::new(&config, &state, Category::Bridge);
        assert_eq!(info.instance_name(), "Test Bridge._hap._tcp.local.");
        assert_eq!(info.txt("md"), Some("Test Bridge"));
        assert_eq!(info.txt("id"), Some(state.mac.as_str()));
        assert_eq!(info.txt("c#"), Some("3"));
        assert_eq!(info.txt("ci"), Some("2"));
        assert_eq!(info.txt("sf"), Some("1"));

        state.add_paired_client(uuid::Uuid::new_v4(), [7; 32]);
        let info = AdvertisementInfo::new(&config, &state, Category::Bridge);
        assert_eq!(info.txt("sf"), Some("0"));
    }
}
