// src/gas_estimator.rs
use async_trait::async_trait;
use ethers::types::U256;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::account::SmartContractAccount;
use crate::client::SmartAccountClient;
use crate::error::ClientError;
use crate::rpc::{self, ETH_GET_BLOCK_BY_NUMBER, ETH_MAX_PRIORITY_FEE_PER_GAS};
use crate::types::{GasFields, UserOperationStruct};

const MULTIPLIER_PRECISION: u64 = 10_000;
const MAX_MULTIPLIER: f64 = 1_000.0;

/// A scaling factor applied to an estimate, between 1 and 1000.
/// Applied with four decimals of precision: 1.00004 acts as 1.0, 1.00006 as 1.0001.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Multiplier(f64);

impl Multiplier {
    pub fn new(value: f64) -> Result<Self, ClientError> {
        if !value.is_finite() || !(1.0..=MAX_MULTIPLIER).contains(&value) {
            return Err(ClientError::Configuration(format!(
                "multiplier must be a finite number between 1 and {}, got {}",
                MAX_MULTIPLIER, value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn apply(&self, value: U256) -> U256 {
        let scaled = (self.0 * MULTIPLIER_PRECISION as f64).round() as u64;
        value.saturating_mul(U256::from(scaled)) / U256::from(MULTIPLIER_PRECISION)
    }
}

/// Caller-supplied replacement for one estimated field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GasOverride {
    /// Used verbatim.
    Value(U256),
    Multiplier(Multiplier),
}

/// Client-wide adjustment of one estimated field: `clamp(estimate * multiplier, min, max)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeeOption {
    pub multiplier: Option<Multiplier>,
    pub min: Option<U256>,
    pub max: Option<U256>,
}

impl FeeOption {
    pub fn apply(&self, value: U256) -> U256 {
        let mut value = self.multiplier.map(|m| m.apply(value)).unwrap_or(value);
        if let Some(min) = self.min {
            value = value.max(min);
        }
        if let Some(max) = self.max {
            value = value.min(max);
        }
        value
    }
}

/// Per-call overrides for a single user operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserOperationOverrides {
    pub call_gas_limit: Option<GasOverride>,
    pub verification_gas_limit: Option<GasOverride>,
    pub pre_verification_gas: Option<GasOverride>,
    pub max_fee_per_gas: Option<GasOverride>,
    pub max_priority_fee_per_gas: Option<GasOverride>,
    /// Forwarded untouched as the third `eth_estimateUserOperationGas` parameter.
    pub state_override: Option<Value>,
}

/// Fee options fixed when the client is created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserOperationFeeOptions {
    pub call_gas_limit: Option<FeeOption>,
    pub verification_gas_limit: Option<FeeOption>,
    pub pre_verification_gas: Option<FeeOption>,
    pub max_fee_per_gas: Option<FeeOption>,
    pub max_priority_fee_per_gas: Option<FeeOption>,
}

/// Resolves a field: an override wins, else the fee option, else the raw estimate.
pub fn apply_override_or_fee_option(
    estimate: U256,
    override_value: Option<&GasOverride>,
    fee_option: Option<&FeeOption>,
) -> U256 {
    match (override_value, fee_option) {
        (Some(GasOverride::Value(value)), _) => *value,
        (Some(GasOverride::Multiplier(multiplier)), _) => multiplier.apply(estimate),
        (None, Some(option)) => option.apply(estimate),
        (None, None) => estimate,
    }
}

pub struct MiddlewareContext<'a> {
    pub client: &'a SmartAccountClient,
    pub account: &'a dyn SmartContractAccount,
    pub overrides: Option<&'a UserOperationOverrides>,
    pub fee_options: Option<&'a UserOperationFeeOptions>,
}

impl<'a> MiddlewareContext<'a> {
    fn resolve(
        &self,
        estimate: U256,
        pick_override: impl Fn(&UserOperationOverrides) -> Option<&GasOverride>,
        pick_option: impl Fn(&UserOperationFeeOptions) -> Option<&FeeOption>,
    ) -> U256 {
        apply_override_or_fee_option(
            estimate,
            self.overrides.and_then(&pick_override),
            self.fee_options.and_then(&pick_option),
        )
    }
}

/// One step of user-operation building that fills in the fields it owns.
#[async_trait]
pub trait ClientMiddleware: Send + Sync {
    async fn call(
        &self,
        uo: UserOperationStruct,
        ctx: &MiddlewareContext<'_>,
    ) -> Result<UserOperationStruct, ClientError>;
}

/// Fills the three gas limits from `eth_estimateUserOperationGas`.
#[derive(Debug, Clone)]
pub struct GasEstimator {
    zero_gas_fields: bool,
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self { zero_gas_fields: true }
    }
}

impl GasEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the outbound estimate request carries explicit `0x0` gas limits.
    /// Some bundlers reject the request when these fields are missing or stale.
    pub fn zero_gas_fields(mut self, enabled: bool) -> Self {
        self.zero_gas_fields = enabled;
        self
    }
}

#[async_trait]
impl ClientMiddleware for GasEstimator {
    async fn call(
        &self,
        mut uo: UserOperationStruct,
        ctx: &MiddlewareContext<'_>,
    ) -> Result<UserOperationStruct, ClientError> {
        let mut request = uo.with_placeholder_signature(&ctx.account.dummy_signature());
        if self.zero_gas_fields {
            *request.gas_mut() = GasFields::default();
        }

        let state_override = ctx.overrides.and_then(|o| o.state_override.clone());
        let estimates = ctx
            .client
            .estimate_user_operation_gas(&request, ctx.account.entry_point().address, state_override)
            .await?;
        debug!("eth_estimateUserOperationGas response: {:?}", estimates);

        let gas = GasFields {
            call_gas_limit: ctx.resolve(
                estimates.call_gas_limit,
                |o| o.call_gas_limit.as_ref(),
                |f| f.call_gas_limit.as_ref(),
            ),
            verification_gas_limit: ctx.resolve(
                estimates.verification_gas_limit,
                |o| o.verification_gas_limit.as_ref(),
                |f| f.verification_gas_limit.as_ref(),
            ),
            pre_verification_gas: ctx.resolve(
                estimates.pre_verification_gas,
                |o| o.pre_verification_gas.as_ref(),
                |f| f.pre_verification_gas.as_ref(),
            ),
        };
        *uo.gas_mut() = gas;
        Ok(uo)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockFees {
    #[serde(default)]
    base_fee_per_gas: Option<U256>,
}

/// Fills EIP-1559 fee fields from the node: `maxFee = baseFee * 1.2 + priorityFee`.
#[derive(Debug, Clone, Default)]
pub struct FeeEstimator;

#[async_trait]
impl ClientMiddleware for FeeEstimator {
    async fn call(
        &self,
        mut uo: UserOperationStruct,
        ctx: &MiddlewareContext<'_>,
    ) -> Result<UserOperationStruct, ClientError> {
        let transport = ctx.client.transport();
        let block: Option<BlockFees> =
            rpc::request(transport, ETH_GET_BLOCK_BY_NUMBER, vec![json!("latest"), json!(false)])
                .await?;
        let base_fee = block.and_then(|b| b.base_fee_per_gas).ok_or_else(|| {
            ClientError::Configuration(format!(
                "chain {} does not report baseFeePerGas",
                ctx.client.chain().id
            ))
        })?;
        let priority_fee: U256 =
            rpc::request(transport, ETH_MAX_PRIORITY_FEE_PER_GAS, vec![]).await?;

        let max_priority_fee_per_gas = ctx.resolve(
            priority_fee,
            |o| o.max_priority_fee_per_gas.as_ref(),
            |f| f.max_priority_fee_per_gas.as_ref(),
        );
        let estimated_max_fee = (base_fee.saturating_mul(U256::from(12)) / U256::from(10))
            .saturating_add(max_priority_fee_per_gas);
        let max_fee_per_gas = ctx.resolve(
            estimated_max_fee,
            |o| o.max_fee_per_gas.as_ref(),
            |f| f.max_fee_per_gas.as_ref(),
        );

        let fees = uo.fees_mut();
        fees.max_fee_per_gas = max_fee_per_gas;
        fees.max_priority_fee_per_gas = max_priority_fee_per_gas;
        Ok(uo)
    }
}
