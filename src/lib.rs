// src/lib.rs
//! ERC-4337 user operation pipeline for Bitlayer smart accounts: method-routed
//! bundler / paymaster transport, gas and fee estimation, paymaster sponsorship
//! and the send flow that ties them together.

pub mod account;
pub mod client;
pub mod config;
pub mod error;
pub mod gas_estimator;
pub mod paymaster;
pub mod retry;
pub mod rpc;
pub mod sponsor;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use client::{
    create_smart_account_client, CreateSmartAccountClientParams, SmartAccountClient,
    UserOperationCallData,
};
pub use config::{ConfigArgs, SmartAccountConfig};
pub use error::{ClientError, FailureKind, SendError, SendStage, SignerError, TransportError};
pub use retry::RetryPolicy;
pub use sponsor::{send_sponsored_user_operation, SendOutcome, SendUserOperationParams};
pub use transport::{bundler_paymaster_transport, HttpTransport, RpcTransport, SplitTransport};
pub use types::{PaymasterSponsorContext, UserOperationStruct};
