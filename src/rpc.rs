// src/rpc.rs
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::RpcTransport;

pub const ETH_SEND_USER_OPERATION: &str = "eth_sendUserOperation";
pub const ETH_ESTIMATE_USER_OPERATION_GAS: &str = "eth_estimateUserOperationGas";
pub const ETH_GET_USER_OPERATION_RECEIPT: &str = "eth_getUserOperationReceipt";
pub const ETH_GET_USER_OPERATION_BY_HASH: &str = "eth_getUserOperationByHash";
pub const ETH_SUPPORTED_ENTRY_POINTS: &str = "eth_supportedEntryPoints";

pub const PM_SUPPORTED_TOKENS: &str = "pm_supported_tokens";
pub const PM_SPONSOR_USEROP: &str = "pm_sponsor_userop";
pub const PM_ENTRYPOINTS: &str = "pm_entrypoints";

pub const ETH_MAX_PRIORITY_FEE_PER_GAS: &str = "eth_maxPriorityFeePerGas";
pub const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
pub const PERSONAL_SIGN: &str = "personal_sign";

/// Methods served by the bundler.
pub const BUNDLER_METHODS: &[&str] = &[
    ETH_SEND_USER_OPERATION,
    ETH_ESTIMATE_USER_OPERATION_GAS,
    ETH_GET_USER_OPERATION_RECEIPT,
    ETH_GET_USER_OPERATION_BY_HASH,
    ETH_SUPPORTED_ENTRY_POINTS,
];

/// Methods served by the paymaster.
pub const PAYMASTER_METHODS: &[&str] = &[PM_SUPPORTED_TOKENS, PM_SPONSOR_USEROP, PM_ENTRYPOINTS];

/// Issues `method` and decodes its result into `R`.
pub async fn request<R: DeserializeOwned>(
    transport: &dyn RpcTransport,
    method: &str,
    params: Vec<Value>,
) -> Result<R, TransportError> {
    debug!("-> {} via {}", method, transport.endpoint());
    let raw = transport.request(method, params).await?;
    serde_json::from_value(raw).map_err(|source| TransportError::InvalidResponse {
        method: method.to_string(),
        source,
    })
}
