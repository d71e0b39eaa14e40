// src/types.rs
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256, U64};
use ethers::utils::keccak256;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ClientError;

/// Byte length of the `paymaster || verificationGasLimit || postOpGasLimit` prefix in a v0.7 blob.
const PACKED_PAYMASTER_PREFIX_LEN: usize = 20 + 16 + 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPointVersion {
    #[serde(rename = "0.6.0")]
    V6,
    #[serde(rename = "0.7.0")]
    V7,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub address: Address,
    pub version: EntryPointVersion,
}

/// The three gas limits owned by estimation and, later, by the paymaster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFields {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeFields {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV6 {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    #[serde(flatten)]
    pub gas: GasFields,
    #[serde(flatten)]
    pub fees: FeeFields,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV7 {
    pub sender: Address,
    pub nonce: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Bytes,
    #[serde(flatten)]
    pub gas: GasFields,
    #[serde(flatten)]
    pub fees: FeeFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    pub signature: Bytes,
}

/// A user operation for either entry point version. Serializes to the flat
/// camelCase hex encoding bundlers and paymasters expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserOperationStruct {
    V6(UserOperationV6),
    V7(UserOperationV7),
}

impl UserOperationStruct {
    pub fn version(&self) -> EntryPointVersion {
        match self {
            UserOperationStruct::V6(_) => EntryPointVersion::V6,
            UserOperationStruct::V7(_) => EntryPointVersion::V7,
        }
    }

    pub fn sender(&self) -> Address {
        match self {
            UserOperationStruct::V6(op) => op.sender,
            UserOperationStruct::V7(op) => op.sender,
        }
    }

    pub fn nonce(&self) -> U256 {
        match self {
            UserOperationStruct::V6(op) => op.nonce,
            UserOperationStruct::V7(op) => op.nonce,
        }
    }

    pub fn gas(&self) -> &GasFields {
        match self {
            UserOperationStruct::V6(op) => &op.gas,
            UserOperationStruct::V7(op) => &op.gas,
        }
    }

    pub fn gas_mut(&mut self) -> &mut GasFields {
        match self {
            UserOperationStruct::V6(op) => &mut op.gas,
            UserOperationStruct::V7(op) => &mut op.gas,
        }
    }

    pub fn fees(&self) -> &FeeFields {
        match self {
            UserOperationStruct::V6(op) => &op.fees,
            UserOperationStruct::V7(op) => &op.fees,
        }
    }

    pub fn fees_mut(&mut self) -> &mut FeeFields {
        match self {
            UserOperationStruct::V6(op) => &mut op.fees,
            UserOperationStruct::V7(op) => &mut op.fees,
        }
    }

    pub fn signature(&self) -> &Bytes {
        match self {
            UserOperationStruct::V6(op) => &op.signature,
            UserOperationStruct::V7(op) => &op.signature,
        }
    }

    /// Returns a copy carrying `signature`. Signing is the only stage that produces one.
    pub fn with_signature(&self, signature: Bytes) -> Self {
        let mut op = self.clone();
        match &mut op {
            UserOperationStruct::V6(inner) => inner.signature = signature,
            UserOperationStruct::V7(inner) => inner.signature = signature,
        }
        op
    }

    /// Copy used for pre-signing RPCs: an unsigned op carries the account's dummy signature.
    pub fn with_placeholder_signature(&self, dummy: &Bytes) -> Self {
        if self.signature().is_empty() {
            self.with_signature(dummy.clone())
        } else {
            self.clone()
        }
    }

    /// Paymaster fields in their packed `paymasterAndData` form.
    pub fn paymaster_and_data(&self) -> Bytes {
        match self {
            UserOperationStruct::V6(op) => op.paymaster_and_data.clone(),
            UserOperationStruct::V7(op) => pack_paymaster_and_data(op),
        }
    }

    pub fn has_paymaster(&self) -> bool {
        !self.paymaster_and_data().is_empty()
    }

    /// Stores a packed `paymasterAndData` blob in the layout of this op's version.
    pub fn set_paymaster_and_data(&mut self, blob: Bytes) -> Result<(), ClientError> {
        match self {
            UserOperationStruct::V6(op) => {
                op.paymaster_and_data = blob;
            }
            UserOperationStruct::V7(op) => {
                if blob.is_empty() {
                    op.paymaster = None;
                    op.paymaster_verification_gas_limit = None;
                    op.paymaster_post_op_gas_limit = None;
                    op.paymaster_data = None;
                    return Ok(());
                }
                if blob.len() < PACKED_PAYMASTER_PREFIX_LEN {
                    return Err(ClientError::MalformedPaymasterData(format!(
                        "expected at least {} bytes for a v0.7 paymaster, got {}",
                        PACKED_PAYMASTER_PREFIX_LEN,
                        blob.len()
                    )));
                }
                op.paymaster = Some(Address::from_slice(&blob[..20]));
                op.paymaster_verification_gas_limit = Some(U256::from_big_endian(&blob[20..36]));
                op.paymaster_post_op_gas_limit = Some(U256::from_big_endian(&blob[36..52]));
                op.paymaster_data = Some(Bytes::from(blob[52..].to_vec()));
            }
        }
        Ok(())
    }

    /// v0.7 packs gas limits, fees and paymaster gas limits into 128-bit halves.
    /// Larger values would be hashed truncated while submitted in full.
    pub fn ensure_packable(&self) -> Result<(), ClientError> {
        let UserOperationStruct::V7(op) = self else {
            return Ok(());
        };
        let fields = [
            ("callGasLimit", Some(op.gas.call_gas_limit)),
            ("verificationGasLimit", Some(op.gas.verification_gas_limit)),
            ("maxFeePerGas", Some(op.fees.max_fee_per_gas)),
            ("maxPriorityFeePerGas", Some(op.fees.max_priority_fee_per_gas)),
            ("paymasterVerificationGasLimit", op.paymaster_verification_gas_limit),
            ("paymasterPostOpGasLimit", op.paymaster_post_op_gas_limit),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                if value > U256::from(u128::MAX) {
                    return Err(ClientError::Configuration(format!(
                        "{} {} does not fit in 128 bits",
                        name, value
                    )));
                }
            }
        }
        Ok(())
    }

    /// ERC-4337 user operation hash for the given entry point and chain.
    /// For v0.7, callers check [`Self::ensure_packable`] first.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let packed = match self {
            UserOperationStruct::V6(op) => encode(&[
                Token::Address(op.sender),
                Token::Uint(op.nonce),
                Token::FixedBytes(keccak256(&op.init_code).to_vec()),
                Token::FixedBytes(keccak256(&op.call_data).to_vec()),
                Token::Uint(op.gas.call_gas_limit),
                Token::Uint(op.gas.verification_gas_limit),
                Token::Uint(op.gas.pre_verification_gas),
                Token::Uint(op.fees.max_fee_per_gas),
                Token::Uint(op.fees.max_priority_fee_per_gas),
                Token::FixedBytes(keccak256(&op.paymaster_and_data).to_vec()),
            ]),
            UserOperationStruct::V7(op) => {
                let mut init_code = Vec::new();
                if let Some(factory) = op.factory {
                    init_code.extend_from_slice(factory.as_bytes());
                    if let Some(data) = &op.factory_data {
                        init_code.extend_from_slice(data);
                    }
                }
                encode(&[
                    Token::Address(op.sender),
                    Token::Uint(op.nonce),
                    Token::FixedBytes(keccak256(&init_code).to_vec()),
                    Token::FixedBytes(keccak256(&op.call_data).to_vec()),
                    Token::FixedBytes(
                        pack_u128_pair(op.gas.verification_gas_limit, op.gas.call_gas_limit).to_vec(),
                    ),
                    Token::Uint(op.gas.pre_verification_gas),
                    Token::FixedBytes(
                        pack_u128_pair(op.fees.max_priority_fee_per_gas, op.fees.max_fee_per_gas)
                            .to_vec(),
                    ),
                    Token::FixedBytes(keccak256(pack_paymaster_and_data(op)).to_vec()),
                ])
            }
        };

        let outer = encode(&[
            Token::FixedBytes(keccak256(&packed).to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ]);
        H256::from(keccak256(outer))
    }
}

fn low_u128_bytes(value: U256) -> [u8; 16] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    let mut out = [0u8; 16];
    out.copy_from_slice(&buf[16..]);
    out
}

fn pack_u128_pair(high: U256, low: U256) -> [u8; 32] {
    let mut packed = [0u8; 32];
    packed[..16].copy_from_slice(&low_u128_bytes(high));
    packed[16..].copy_from_slice(&low_u128_bytes(low));
    packed
}

fn pack_paymaster_and_data(op: &UserOperationV7) -> Bytes {
    let Some(paymaster) = op.paymaster else {
        return Bytes::new();
    };
    let mut data = Vec::with_capacity(PACKED_PAYMASTER_PREFIX_LEN);
    data.extend_from_slice(paymaster.as_bytes());
    data.extend_from_slice(&low_u128_bytes(op.paymaster_verification_gas_limit.unwrap_or_default()));
    data.extend_from_slice(&low_u128_bytes(op.paymaster_post_op_gas_limit.unwrap_or_default()));
    if let Some(extra) = &op.paymaster_data {
        data.extend_from_slice(extra);
    }
    Bytes::from(data)
}

/// A single call executed by the smart account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub target: Address,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
}

impl Call {
    pub fn new(target: Address, data: Bytes) -> Self {
        Self { target, data, value: U256::zero() }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub id: u64,
    pub name: String,
    pub rpc_url: String,
    pub explorer_url: Option<String>,
}

/// Parses a JSON-RPC quantity given as `0x`-hex or as a decimal string.
pub fn parse_quantity(raw: &str) -> Result<U256, String> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some("") => Ok(U256::zero()),
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| format!("{raw}: {e:?}")),
        None => U256::from_dec_str(raw).map_err(|e| format!("{raw}: {e:?}")),
    }
}

/// Paymasters and bundlers answer quantities as numbers, hex strings or decimal strings.
pub(crate) mod quantity {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(U256::from(n)),
            Raw::Text(s) => parse_quantity(&s).map_err(serde::de::Error::custom),
        }
    }
}

/// `eth_estimateUserOperationGas` result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    #[serde(deserialize_with = "quantity::deserialize")]
    pub pre_verification_gas: U256,
    #[serde(deserialize_with = "quantity::deserialize")]
    pub verification_gas_limit: U256,
    #[serde(deserialize_with = "quantity::deserialize")]
    pub call_gas_limit: U256,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymasterNativeToken {
    #[serde(deserialize_with = "quantity::deserialize")]
    pub gas: U256,
    pub price: f64,
    pub decimals: u8,
    pub symbol: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymasterTokenType {
    System,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymasterSupportedToken {
    #[serde(rename = "type")]
    pub token_type: PaymasterTokenType,
    pub token: Address,
    pub symbol: String,
    pub decimals: u8,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterSupportedTokensResponse {
    pub free_gas: bool,
    #[serde(default)]
    pub native: Option<PaymasterNativeToken>,
    #[serde(default)]
    pub tokens: Vec<PaymasterSupportedToken>,
}

impl PaymasterSupportedTokensResponse {
    /// The paymaster will sponsor when gas is free or it accepts at least one token.
    pub fn can_sponsor(&self) -> bool {
        self.free_gas || !self.tokens.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymasterSponsorType {
    #[serde(rename = "0")]
    Native,
    #[serde(rename = "1")]
    Prefund,
    #[serde(rename = "2")]
    Postfund,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymasterSponsorContext {
    #[serde(rename = "type")]
    pub sponsor_type: PaymasterSponsorType,
    /// Ignored by the paymaster for `Native`.
    pub token: Address,
}

impl PaymasterSponsorContext {
    pub fn native() -> Self {
        Self { sponsor_type: PaymasterSponsorType::Native, token: Address::zero() }
    }

    pub fn prefund(token: Address) -> Self {
        Self { sponsor_type: PaymasterSponsorType::Prefund, token }
    }

    pub fn postfund(token: Address) -> Self {
        Self { sponsor_type: PaymasterSponsorType::Postfund, token }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterSponsorUserOpResponse {
    pub paymaster_and_data: Bytes,
    #[serde(deserialize_with = "quantity::deserialize")]
    pub call_gas_limit: U256,
    #[serde(deserialize_with = "quantity::deserialize")]
    pub verification_gas_limit: U256,
    #[serde(deserialize_with = "quantity::deserialize")]
    pub pre_verification_gas: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceiptSummary {
    pub transaction_hash: H256,
    #[serde(default)]
    pub block_hash: Option<H256>,
    #[serde(default)]
    pub block_number: Option<U64>,
}

/// `eth_getUserOperationReceipt` result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    #[serde(default)]
    pub entry_point: Option<Address>,
    pub sender: Address,
    #[serde(deserialize_with = "quantity::deserialize")]
    pub nonce: U256,
    #[serde(default)]
    pub paymaster: Option<Address>,
    #[serde(deserialize_with = "quantity::deserialize")]
    pub actual_gas_cost: U256,
    #[serde(deserialize_with = "quantity::deserialize")]
    pub actual_gas_used: U256,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    pub receipt: TransactionReceiptSummary,
}

/// `eth_getUserOperationByHash` result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationByHash {
    pub user_operation: UserOperationStruct,
    pub entry_point: Address,
    #[serde(default)]
    pub transaction_hash: Option<H256>,
    #[serde(default)]
    pub block_hash: Option<H256>,
    #[serde(default)]
    pub block_number: Option<U64>,
}
