// src/client.rs
use std::sync::Arc;

use ethers::types::{Address, Bytes, H256};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::account::{
    AccountParams, SmartAccountFactory, SmartContractAccount, WalletClient, WalletClientSigner,
};
use crate::config::SmartAccountConfig;
use crate::error::ClientError;
use crate::gas_estimator::{
    ClientMiddleware, FeeEstimator, GasEstimator, MiddlewareContext, UserOperationFeeOptions,
    UserOperationOverrides,
};
use crate::paymaster::PaymasterActions;
use crate::retry::{poll_with_backoff, RetryPolicy};
use crate::rpc::{
    self, ETH_ESTIMATE_USER_OPERATION_GAS, ETH_GET_USER_OPERATION_BY_HASH,
    ETH_GET_USER_OPERATION_RECEIPT, ETH_SEND_USER_OPERATION, ETH_SUPPORTED_ENTRY_POINTS,
};
use crate::transport::{http_bundler_paymaster_transport, RpcTransport};
use crate::types::{
    Call, Chain, EntryPointVersion, FeeFields, GasEstimate, GasFields,
    PaymasterSponsorContext, PaymasterSponsorUserOpResponse, PaymasterSupportedTokensResponse,
    UserOperationByHash, UserOperationReceipt, UserOperationStruct, UserOperationV6,
    UserOperationV7,
};

/// Signer type tag of the EOA adapter.
pub const JSON_RPC_SIGNER_TYPE: &str = "json-rpc";

/// What a user operation executes: one call or a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserOperationCallData {
    Single(Call),
    Batch(Vec<Call>),
}

impl UserOperationCallData {
    /// Exactly one of `tx` / `txs` must be given, and a batch must not be empty.
    pub fn from_parts(tx: Option<Call>, txs: Option<Vec<Call>>) -> Result<Self, ClientError> {
        match (tx, txs) {
            (Some(tx), None) => Ok(UserOperationCallData::Single(tx)),
            (None, Some(txs)) if !txs.is_empty() => Ok(UserOperationCallData::Batch(txs)),
            (None, Some(_)) => Err(ClientError::Configuration("txs must not be empty".into())),
            (Some(_), Some(_)) => {
                Err(ClientError::Configuration("tx and txs are mutually exclusive".into()))
            }
            (None, None) => Err(ClientError::Configuration("tx or txs required".into())),
        }
    }
}

/// A smart account bound to one chain, transport and (optionally) account,
/// with gas-aware builders and paymaster actions.
pub struct SmartAccountClient {
    chain: Chain,
    transport: Arc<dyn RpcTransport>,
    account: Option<Arc<dyn SmartContractAccount>>,
    fee_estimator: Arc<dyn ClientMiddleware>,
    gas_estimator: Arc<dyn ClientMiddleware>,
    fee_options: Option<UserOperationFeeOptions>,
    paymaster: PaymasterActions,
}

impl SmartAccountClient {
    pub fn new(
        chain: Chain,
        transport: Arc<dyn RpcTransport>,
        account: Option<Arc<dyn SmartContractAccount>>,
        paymaster: PaymasterActions,
    ) -> Self {
        Self {
            chain,
            transport,
            account,
            fee_estimator: Arc::new(FeeEstimator),
            gas_estimator: Arc::new(GasEstimator::new()),
            fee_options: None,
            paymaster,
        }
    }

    pub fn with_gas_estimator(mut self, gas_estimator: Arc<dyn ClientMiddleware>) -> Self {
        self.gas_estimator = gas_estimator;
        self
    }

    pub fn with_fee_estimator(mut self, fee_estimator: Arc<dyn ClientMiddleware>) -> Self {
        self.fee_estimator = fee_estimator;
        self
    }

    pub fn with_fee_options(mut self, fee_options: UserOperationFeeOptions) -> Self {
        self.fee_options = Some(fee_options);
        self
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn transport(&self) -> &dyn RpcTransport {
        self.transport.as_ref()
    }

    pub fn account(&self) -> Result<&Arc<dyn SmartContractAccount>, ClientError> {
        self.account.as_ref().ok_or(ClientError::AccountNotFound)
    }

    pub fn paymaster(&self) -> &PaymasterActions {
        &self.paymaster
    }

    pub async fn estimate_user_operation_gas(
        &self,
        request: &UserOperationStruct,
        entry_point: Address,
        state_override: Option<Value>,
    ) -> Result<GasEstimate, ClientError> {
        let mut params = vec![json!(request), json!(entry_point)];
        if let Some(state_override) = state_override {
            params.push(state_override);
        }
        Ok(rpc::request(self.transport(), ETH_ESTIMATE_USER_OPERATION_GAS, params).await?)
    }

    /// Submits a signed operation; returns the user operation hash, not a transaction hash.
    pub async fn send_raw_user_operation(
        &self,
        request: &UserOperationStruct,
        entry_point: Address,
    ) -> Result<H256, ClientError> {
        let hash: H256 = rpc::request(
            self.transport(),
            ETH_SEND_USER_OPERATION,
            vec![json!(request), json!(entry_point)],
        )
        .await?;
        info!("UserOperation hash: {:?}", hash);
        Ok(hash)
    }

    pub async fn get_user_operation_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<UserOperationReceipt>, ClientError> {
        Ok(rpc::request(self.transport(), ETH_GET_USER_OPERATION_RECEIPT, vec![json!(hash)]).await?)
    }

    pub async fn get_user_operation_by_hash(
        &self,
        hash: H256,
    ) -> Result<Option<UserOperationByHash>, ClientError> {
        Ok(rpc::request(self.transport(), ETH_GET_USER_OPERATION_BY_HASH, vec![json!(hash)]).await?)
    }

    pub async fn supported_entry_points(&self) -> Result<Vec<Address>, ClientError> {
        Ok(rpc::request(self.transport(), ETH_SUPPORTED_ENTRY_POINTS, vec![]).await?)
    }

    /// Unsigned operation with sender, nonce, deployment code and call data set.
    /// Gas and fee fields are left at zero.
    pub async fn prepare_user_operation(
        &self,
        calls: &UserOperationCallData,
    ) -> Result<UserOperationStruct, ClientError> {
        let account = self.account()?;
        let call_data = match calls {
            UserOperationCallData::Single(call) => account.encode_execute(call)?,
            UserOperationCallData::Batch(calls) => account.encode_batch_execute(calls)?,
        };
        let nonce = account.get_nonce().await?;
        let init_code = if account.is_deployed().await? {
            Bytes::new()
        } else {
            account.get_init_code().await?
        };

        let uo = match account.entry_point().version {
            EntryPointVersion::V6 => UserOperationStruct::V6(UserOperationV6 {
                sender: account.address(),
                nonce,
                init_code,
                call_data,
                gas: GasFields::default(),
                fees: FeeFields::default(),
                paymaster_and_data: Bytes::new(),
                signature: Bytes::new(),
            }),
            EntryPointVersion::V7 => {
                let (factory, factory_data) = split_init_code(&init_code)?;
                UserOperationStruct::V7(UserOperationV7 {
                    sender: account.address(),
                    nonce,
                    factory,
                    factory_data,
                    call_data,
                    gas: GasFields::default(),
                    fees: FeeFields::default(),
                    paymaster: None,
                    paymaster_verification_gas_limit: None,
                    paymaster_post_op_gas_limit: None,
                    paymaster_data: None,
                    signature: Bytes::new(),
                })
            }
        };
        Ok(uo)
    }

    /// Runs the fee and gas estimators over a prepared operation.
    pub async fn estimate_user_operation(
        &self,
        uo: UserOperationStruct,
        overrides: Option<&UserOperationOverrides>,
    ) -> Result<UserOperationStruct, ClientError> {
        let account = self.account()?;
        let ctx = MiddlewareContext {
            client: self,
            account: account.as_ref(),
            overrides,
            fee_options: self.fee_options.as_ref(),
        };
        let uo = self.fee_estimator.call(uo, &ctx).await?;
        self.gas_estimator.call(uo, &ctx).await
    }

    pub async fn build_user_operation_from_tx(
        &self,
        tx: &Call,
        overrides: Option<&UserOperationOverrides>,
    ) -> Result<UserOperationStruct, ClientError> {
        let uo = self.prepare_user_operation(&UserOperationCallData::Single(tx.clone())).await?;
        self.estimate_user_operation(uo, overrides).await
    }

    pub async fn build_user_operation_from_txs(
        &self,
        txs: &[Call],
        overrides: Option<&UserOperationOverrides>,
    ) -> Result<UserOperationStruct, ClientError> {
        let calls = UserOperationCallData::from_parts(None, Some(txs.to_vec()))?;
        let uo = self.prepare_user_operation(&calls).await?;
        self.estimate_user_operation(uo, overrides).await
    }

    /// Signs the operation hash through the account and returns the signed copy.
    pub async fn sign_user_operation(
        &self,
        uo: &UserOperationStruct,
    ) -> Result<UserOperationStruct, ClientError> {
        let account = self.account()?;
        uo.ensure_packable()?;
        let hash = uo.hash(account.entry_point().address, self.chain.id);
        debug!("Signing user operation {:?}", hash);
        let signature = account.sign_user_operation_hash(hash).await?;
        Ok(uo.with_signature(signature))
    }

    /// Polls the bundler for the receipt of `hash` and returns the mined transaction hash.
    pub async fn wait_for_user_operation_transaction(
        &self,
        hash: H256,
        policy: &RetryPolicy,
    ) -> Result<H256, ClientError> {
        policy.validate()?;
        let receipt = poll_with_backoff("user operation receipt", policy, || {
            self.get_user_operation_receipt(hash)
        })
        .await?;

        match receipt {
            Some(receipt) => {
                info!(
                    "UserOperation {:?} mined in transaction {:?}",
                    hash, receipt.receipt.transaction_hash
                );
                Ok(receipt.receipt.transaction_hash)
            }
            None => {
                warn!("UserOperation {:?} not mined after {} attempts", hash, policy.max_retries);
                Err(ClientError::ConfirmationTimeout { hash, attempts: policy.max_retries })
            }
        }
    }

    pub fn paymaster_address(&self) -> Address {
        self.paymaster.paymaster_address()
    }

    pub async fn get_supported_tokens(
        &self,
        request: &UserOperationStruct,
    ) -> Result<PaymasterSupportedTokensResponse, ClientError> {
        self.paymaster
            .get_supported_tokens(self.transport(), self.account.as_deref(), request)
            .await
    }

    pub async fn get_sponsor_user_op(
        &self,
        request: &UserOperationStruct,
        context: &PaymasterSponsorContext,
    ) -> Result<PaymasterSponsorUserOpResponse, ClientError> {
        self.paymaster
            .get_sponsor_user_op(self.transport(), self.account.as_deref(), request, context)
            .await
    }

    pub async fn paymaster_entry_points(&self) -> Result<Vec<Address>, ClientError> {
        self.paymaster.entry_points(self.transport()).await
    }
}

fn split_init_code(init_code: &Bytes) -> Result<(Option<Address>, Option<Bytes>), ClientError> {
    if init_code.is_empty() {
        return Ok((None, None));
    }
    if init_code.len() < 20 {
        return Err(ClientError::Account(format!(
            "init code of {} bytes is shorter than a factory address",
            init_code.len()
        )));
    }
    Ok((
        Some(Address::from_slice(&init_code[..20])),
        Some(Bytes::from(init_code[20..].to_vec())),
    ))
}

pub struct CreateSmartAccountClientParams {
    pub chain: Option<Chain>,
    pub eoa: WalletClient,
    pub config: SmartAccountConfig,
    pub fee_options: Option<UserOperationFeeOptions>,
}

/// Composes signer, router transport, contract account and paymaster actions into one client.
/// Nothing is sent over the network until an operation is built.
pub async fn create_smart_account_client(
    params: CreateSmartAccountClientParams,
    account_factory: &dyn SmartAccountFactory,
) -> Result<SmartAccountClient, ClientError> {
    let CreateSmartAccountClientParams { chain, eoa, config, fee_options } = params;
    let chain =
        chain.ok_or_else(|| ClientError::Configuration("Missing required parameter: chain".into()))?;
    config.validate()?;

    let signer = Arc::new(WalletClientSigner::new(eoa, JSON_RPC_SIGNER_TYPE));
    let transport: Arc<dyn RpcTransport> = Arc::new(http_bundler_paymaster_transport(
        &config.bundler_url,
        &config.paymaster_url,
        &chain.rpc_url,
    )?);

    let account = account_factory
        .create_account(AccountParams {
            chain: chain.clone(),
            transport: transport.clone(),
            signer,
            factory_address: config.factory_address,
            factory_version: config.factory_version.clone(),
        })
        .await?;
    info!(
        "Smart account {:?} on chain {} ({})",
        account.address(),
        chain.name,
        chain.id
    );

    let paymaster = PaymasterActions::new(config.api_key, config.paymaster_address);
    let mut client = SmartAccountClient::new(chain, transport, Some(account), paymaster);
    if let Some(fee_options) = fee_options {
        client = client.with_fee_options(fee_options);
    }
    Ok(client)
}
