use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level relay configuration, loaded once at startup from a TOML file.
///
/// Mirrors the fields spec.md §6 enumerates; see `relay-node`'s CLI for how
/// the path is supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub gateway: String,
    pub db: String,
    pub relay_node_name: String,
    /// Address the status HTTP surface (`/v1/summary/total`, `/v1/transfer/:limit`) binds to.
    #[serde(default = "default_status_addr")]
    pub status_addr: String,
    pub chains: Vec<ChainConfig>,
}

fn default_status_addr() -> String {
    "0.0.0.0:8088".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub endpoint: String,
    pub contract_address: String,
    /// Integer basis points (1/10000) the relay advertises to the gateway for this chain.
    pub fee_rate: u32,
    pub gas_token_name: String,
    pub gas_token_decimal: u32,
    pub watch_config: WatchConfig,
    pub transactor_config: TransactorConfig,
    pub token_config: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub polling_interval_secs: u64,
    pub block_delay: u64,
    pub max_block_delta: u64,
    pub forward_block_delay: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactorConfig {
    #[serde(default)]
    pub add_gas_gwei: u64,
    #[serde(default)]
    pub add_gas_estimate_ratio: f64,
    #[serde(default)]
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token_name: String,
    pub token_address: String,
    pub token_decimal: u32,
}

impl RelayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, crate::Error> {
        toml::from_str(raw).map_err(crate::Error::ConfigParse)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let raw = std::fs::read_to_string(path).map_err(crate::Error::ConfigRead)?;
        Self::from_toml_str(&raw)
    }

    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let raw = r#"
            gateway = "https://gateway.example:9443"
            db = "postgres.example:5432"
            relay_node_name = "relay-1"

            [[chains]]
            chain_id = 1
            endpoint = "https://eth.example"
            contract_address = "0x0000000000000000000000000000000000000001"
            fee_rate = 10
            gas_token_name = "ETH"
            gas_token_decimal = 18

            [chains.watch_config]
            polling_interval_secs = 5
            block_delay = 2
            max_block_delta = 2000
            forward_block_delay = 0

            [chains.transactor_config]
            gas_limit = 300000

            [[chains.token_config]]
            token_name = "USDC"
            token_address = "0x0000000000000000000000000000000000000002"
            token_decimal = 6
        "#;

        let cfg = RelayConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.chains.len(), 1);
        assert_eq!(cfg.chain(1).unwrap().token_config[0].token_name, "USDC");
        assert_eq!(cfg.status_addr, "0.0.0.0:8088");
    }
}
