//! Configuration management for the bridge orchestrator
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use ethers::types::Address;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub service: ServiceConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    pub lifecycle: LifecycleConfig,
    pub wallet: WalletConfig,
    pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub instance_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub refresh_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 300,
        }
    }
}

impl RegistryConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Bridge contract that receives the token allowance
    pub bridge_contract: String,
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_lifecycle_retention_secs")]
    pub lifecycle_retention_secs: u64,
}

impl LifecycleConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub confirmation_blocks: u64,
    pub gas_price_strategy: GasPriceStrategy,
    pub max_gas_price_gwei: u64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceStrategy {
    Legacy,
    Eip1559,
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_receipt_poll_interval_ms() -> u64 {
    2_000
}

fn default_lifecycle_retention_secs() -> u64 {
    86_400
}

impl Settings {
    /// Load settings from the file named by `HYDRA_BRIDGE_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("HYDRA_BRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references
    pub fn parse(config_str: &str) -> Result<Self> {
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for (name, chain) in &self.chains {
            if chain.enabled && chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", name);
            }
        }

        self.lifecycle
            .bridge_contract
            .parse::<Address>()
            .with_context(|| {
                format!(
                    "Invalid bridge contract address: {:?}",
                    self.lifecycle.bridge_contract
                )
            })?;

        if self.lifecycle.confirmation_timeout_secs == 0 {
            anyhow::bail!("lifecycle.confirmation_timeout_secs must be non-zero");
        }
        if self.lifecycle.receipt_poll_interval_ms == 0 {
            anyhow::bail!("lifecycle.receipt_poll_interval_ms must be non-zero");
        }
        if self.backend.base_url.is_empty() {
            anyhow::bail!("backend.base_url must be set");
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[service]
instance_id = "bridge-1"

[api]
host = "127.0.0.1"
port = 8080

[metrics]
enabled = false
port = 9090

[backend]
base_url = "${HYDRA_TEST_BACKEND_URL}"

[lifecycle]
bridge_contract = "0x1111111111111111111111111111111111111111"
confirmation_timeout_secs = 600

[wallet]
private_key_env = "BRIDGE_PRIVATE_KEY"

[chains.goerli]
chain_id = 5
name = "Goerli"
rpc_urls = ["https://rpc.goerli.example"]
confirmation_blocks = 2
gas_price_strategy = "eip1559"
max_gas_price_gwei = 200
enabled = true

[chains.mumbai]
chain_id = 80001
name = "Mumbai"
rpc_urls = []
confirmation_blocks = 5
gas_price_strategy = "legacy"
max_gas_price_gwei = 500
enabled = false
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("HYDRA_TEST_BACKEND_URL", "http://backend.local/api");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.backend.base_url, "http://backend.local/api");
        assert_eq!(settings.backend.request_timeout_ms, 15_000);
        assert_eq!(settings.registry.refresh_interval_secs, 300);
        assert_eq!(settings.lifecycle.receipt_poll_interval_ms, 2_000);
        assert_eq!(settings.enabled_chains().len(), 1);
        assert_eq!(
            settings.get_chain_by_id(5).unwrap().gas_price_strategy,
            GasPriceStrategy::Eip1559
        );
    }

    #[test]
    fn test_rejects_invalid_bridge_contract() {
        let broken = SAMPLE
            .replace("${HYDRA_TEST_BACKEND_URL}", "http://backend.local")
            .replace("0x1111111111111111111111111111111111111111", "not-an-address");
        assert!(Settings::parse(&broken).is_err());
    }

    #[test]
    fn test_rejects_no_enabled_chains() {
        let broken = SAMPLE
            .replace("${HYDRA_TEST_BACKEND_URL}", "http://backend.local")
            .replace("enabled = true", "enabled = false");
        assert!(Settings::parse(&broken).is_err());
    }
}
