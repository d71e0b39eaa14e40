// src/account.rs
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use serde_json::json;

use crate::error::{ClientError, SignerError};
use crate::rpc::{self, PERSONAL_SIGN};
use crate::transport::RpcTransport;
use crate::types::{Call, Chain, EntryPoint};

/// Owner-side signer of the smart account.
#[async_trait]
pub trait SmartAccountSigner: Send + Sync {
    fn signer_type(&self) -> &'static str;

    async fn get_address(&self) -> Result<Address, SignerError>;

    /// Signs `message` as an EIP-191 personal message.
    async fn sign_message(&self, message: Bytes) -> Result<Bytes, SignerError>;
}

/// The smart contract account the client operates through. Its ABI encoding,
/// nonce source and deployment checks live outside this crate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmartContractAccount: Send + Sync {
    fn address(&self) -> Address;

    fn entry_point(&self) -> EntryPoint;

    async fn is_deployed(&self) -> Result<bool, ClientError>;

    async fn get_nonce(&self) -> Result<U256, ClientError>;

    /// `factory || factoryData` used to deploy the account with its first operation.
    async fn get_init_code(&self) -> Result<Bytes, ClientError>;

    fn encode_execute(&self, call: &Call) -> Result<Bytes, ClientError>;

    fn encode_batch_execute(&self, calls: &[Call]) -> Result<Bytes, ClientError>;

    /// Signature-shaped placeholder accepted by simulation.
    fn dummy_signature(&self) -> Bytes;

    async fn sign_user_operation_hash(&self, hash: H256) -> Result<Bytes, SignerError>;
}

/// Everything a contract-account implementation needs to bind itself to a chain and owner.
pub struct AccountParams {
    pub chain: Chain,
    pub transport: Arc<dyn RpcTransport>,
    pub signer: Arc<dyn SmartAccountSigner>,
    pub factory_address: Address,
    pub factory_version: String,
}

#[async_trait]
pub trait SmartAccountFactory: Send + Sync {
    async fn create_account(
        &self,
        params: AccountParams,
    ) -> Result<Arc<dyn SmartContractAccount>, ClientError>;
}

#[async_trait]
impl<F> SmartAccountFactory for F
where
    F: Fn(AccountParams) -> Result<Arc<dyn SmartContractAccount>, ClientError> + Send + Sync,
{
    async fn create_account(
        &self,
        params: AccountParams,
    ) -> Result<Arc<dyn SmartContractAccount>, ClientError> {
        self(params)
    }
}

/// An EOA reachable over JSON-RPC, e.g. an injected or remote wallet.
#[derive(Clone)]
pub struct WalletClient {
    pub transport: Arc<dyn RpcTransport>,
    pub address: Address,
}

impl WalletClient {
    pub fn new(transport: Arc<dyn RpcTransport>, address: Address) -> Self {
        Self { transport, address }
    }
}

/// Adapts a [`WalletClient`] into a [`SmartAccountSigner`] that signs with `personal_sign`.
pub struct WalletClientSigner {
    client: WalletClient,
    signer_type: &'static str,
}

impl WalletClientSigner {
    pub fn new(client: WalletClient, signer_type: &'static str) -> Self {
        Self { client, signer_type }
    }
}

#[async_trait]
impl SmartAccountSigner for WalletClientSigner {
    fn signer_type(&self) -> &'static str {
        self.signer_type
    }

    async fn get_address(&self) -> Result<Address, SignerError> {
        Ok(self.client.address)
    }

    async fn sign_message(&self, message: Bytes) -> Result<Bytes, SignerError> {
        let signature: Bytes = rpc::request(
            self.client.transport.as_ref(),
            PERSONAL_SIGN,
            vec![json!(message), json!(self.client.address)],
        )
        .await?;
        Ok(signature)
    }
}
