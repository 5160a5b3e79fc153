//! Application configuration, loaded from the environment.

use serde::Deserialize;

use crate::chain::transaction::Network;
use crate::chain::ChainError;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub database_url: String,

    // Stacks settings
    #[serde(default = "default_stacks_network")]
    pub stacks_network: String,

    #[serde(default = "default_stacks_api_url")]
    pub stacks_api_url: String,

    /// CTF exchange contract (`address.name`). Settlement is disabled when
    /// absent.
    #[serde(default)]
    pub ctf_exchange_address: Option<String>,

    /// Operator signing key. Settlement is disabled when absent.
    #[serde(default)]
    pub stacks_operator_private_key: Option<String>,

    /// Conditional tokens contract (`address.name`), informational for
    /// clients computing transfer allowances.
    #[serde(default)]
    pub conditional_tokens_address: Option<String>,

    /// Shared secret for admin endpoints
    pub admin_api_key: String,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_stacks_network() -> String {
    "devnet".to_string()
}

fn default_stacks_api_url() -> String {
    "http://localhost:3999".to_string()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        Ok(app_config)
    }

    pub fn network(&self) -> Result<Network, ChainError> {
        Network::parse(&self.stacks_network)
    }

    /// Settlement runs only with both a contract id and an operator key.
    pub fn settlement_configured(&self) -> bool {
        self.settlement_contract().is_some()
            && self
                .stacks_operator_private_key
                .as_deref()
                .map(|key| !key.is_empty())
                .unwrap_or(false)
    }

    pub fn settlement_contract(&self) -> Option<&str> {
        self.ctf_exchange_address
            .as_deref()
            .filter(|addr| !addr.is_empty() && addr.contains('.'))
    }
}
