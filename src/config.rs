//! Node configuration, loadable from TOML.
//!
//! ```toml
//! store_prefix = "statechannel"
//! protocol_timeout_ms = 10000
//!
//! [network]
//! proxy_factory = "0x..."
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::Address;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root of every storage path.
    pub store_prefix: String,
    /// How long an initiator waits for the counterparty's turn.
    pub protocol_timeout_ms: u64,
    /// How long lock acquisition may block.
    pub lock_timeout_ms: u64,
    /// Buffer of the outbound event channel. Slow subscribers lag behind and
    /// miss events once it is full.
    pub event_capacity: usize,
    pub network: NetworkContext,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            store_prefix: "statechannel".to_owned(),
            protocol_timeout_ms: 10_000,
            lock_timeout_ms: 15_000,
            event_capacity: 1024,
            network: NetworkContext::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn protocol_timeout(&self) -> Duration {
        Duration::from_millis(self.protocol_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Addresses of the on-chain contracts the commitments refer to. Both parties
/// of a channel must use the same values, otherwise their commitments differ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkContext {
    #[serde(deserialize_with = "hex_address")]
    pub proxy_factory: Address,
    #[serde(deserialize_with = "hex_address")]
    pub multisig_mastercopy: Address,
    /// App definition of the free balance app.
    #[serde(deserialize_with = "hex_address")]
    pub identity_app: Address,
    #[serde(deserialize_with = "hex_address")]
    pub conditional_transaction_delegate_target: Address,
    #[serde(deserialize_with = "hex_address")]
    pub two_party_fixed_outcome_interpreter: Address,
    #[serde(deserialize_with = "hex_address")]
    pub single_asset_two_party_coin_transfer_interpreter: Address,
    #[serde(deserialize_with = "hex_address")]
    pub multi_asset_multi_party_coin_transfer_interpreter: Address,
    #[serde(deserialize_with = "hex_address")]
    pub deposit_app: Address,
}

fn hex_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse()
        .map_err(|_| serde::de::Error::custom(format!("invalid address {:?}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = NodeConfig::from_toml_str("").unwrap();
        assert_eq!(config.store_prefix, "statechannel");
        assert_eq!(config.protocol_timeout(), Duration::from_secs(10));
        assert_eq!(config.lock_timeout(), Duration::from_secs(15));
        assert_eq!(config.network, NetworkContext::default());
    }

    #[test]
    fn partial_override() {
        let config = NodeConfig::from_toml_str(
            r#"
            store_prefix = "node-a"
            lock_timeout_ms = 50

            [network]
            proxy_factory = "0x95222290DD7278Aa3Ddd389Cc1E1d165CC4BAfe5"
            deposit_app = "0000000000000000000000000000000000000007"
            "#,
        )
        .unwrap();
        assert_eq!(config.store_prefix, "node-a");
        assert_eq!(config.lock_timeout_ms, 50);
        assert_eq!(config.protocol_timeout_ms, 10_000);
        assert_eq!(
            config.network.proxy_factory,
            "95222290dd7278aa3ddd389cc1e1d165cc4bafe5".parse().unwrap()
        );
        assert_eq!(config.network.deposit_app.0[19], 7);
    }

    #[test]
    fn invalid_address() {
        let err = NodeConfig::from_toml_str("[network]\nidentity_app = \"0x1234\"").unwrap_err();
        assert!(err.to_string().contains("invalid address"));
    }
}
