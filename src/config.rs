// src/config.rs
use clap::Args;
use ethers::types::Address;

use crate::error::ClientError;

pub const DEFAULT_FACTORY_VERSION: &str = "v1.1.0";

/// Endpoints and contract addresses a smart account client is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartAccountConfig {
    pub bundler_url: String,
    pub paymaster_url: String,
    pub paymaster_address: Address,
    pub api_key: String,
    pub factory_address: Address,
    pub factory_version: String,
}

impl SmartAccountConfig {
    pub fn validate(&self) -> Result<(), ClientError> {
        check_url("bundler_url", &self.bundler_url)?;
        check_url("paymaster_url", &self.paymaster_url)?;
        if self.api_key.trim().is_empty() {
            return Err(ClientError::Configuration("api_key must not be empty".into()));
        }
        if self.factory_version.trim().is_empty() {
            return Err(ClientError::Configuration("factory_version must not be empty".into()));
        }
        Ok(())
    }
}

fn check_url(name: &str, url: &str) -> Result<(), ClientError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ClientError::Configuration(format!("{} must be an http(s) url, got {:?}", name, url)))
    }
}

/// Command line / environment form of [`SmartAccountConfig`].
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[clap(long, env = "BUNDLER_URL")]
    pub bundler_url: String,

    #[clap(long, env = "PAYMASTER_URL")]
    pub paymaster_url: String,

    #[clap(long, env = "PAYMASTER_ADDRESS")]
    pub paymaster_address: String,

    #[clap(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[clap(long, env = "FACTORY_ADDRESS")]
    pub factory_address: String,

    #[clap(long, env = "FACTORY_VERSION", default_value = DEFAULT_FACTORY_VERSION)]
    pub factory_version: String,
}

impl TryFrom<ConfigArgs> for SmartAccountConfig {
    type Error = ClientError;

    fn try_from(args: ConfigArgs) -> Result<Self, Self::Error> {
        let config = SmartAccountConfig {
            paymaster_address: parse_address("paymaster_address", &args.paymaster_address)?,
            factory_address: parse_address("factory_address", &args.factory_address)?,
            bundler_url: args.bundler_url,
            paymaster_url: args.paymaster_url,
            api_key: args.api_key,
            factory_version: args.factory_version,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_address(name: &str, raw: &str) -> Result<Address, ClientError> {
    raw.parse()
        .map_err(|e| ClientError::Configuration(format!("invalid {} {:?}: {}", name, raw, e)))
}
