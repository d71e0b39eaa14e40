// src/paymaster.rs
use ethers::types::Address;
use serde_json::json;
use tracing::debug;

use crate::account::SmartContractAccount;
use crate::error::ClientError;
use crate::rpc::{self, PM_ENTRYPOINTS, PM_SPONSOR_USEROP, PM_SUPPORTED_TOKENS};
use crate::transport::RpcTransport;
use crate::types::{
    PaymasterSponsorContext, PaymasterSponsorUserOpResponse, PaymasterSupportedTokensResponse,
    UserOperationStruct,
};

/// Sponsorship negotiation with the paymaster service. Neither call submits
/// anything or mutates the operation it is given.
#[derive(Debug, Clone)]
pub struct PaymasterActions {
    api_key: String,
    address: Address,
}

impl PaymasterActions {
    pub fn new(api_key: impl Into<String>, address: Address) -> Self {
        Self { api_key: api_key.into(), address }
    }

    /// Contract address of the paymaster.
    pub fn paymaster_address(&self) -> Address {
        self.address
    }

    /// Calls `pm_supported_tokens` for `request`.
    pub async fn get_supported_tokens(
        &self,
        transport: &dyn RpcTransport,
        account: Option<&dyn SmartContractAccount>,
        request: &UserOperationStruct,
    ) -> Result<PaymasterSupportedTokensResponse, ClientError> {
        let account = account.ok_or(ClientError::AccountNotFound)?;
        let request = request.with_placeholder_signature(&account.dummy_signature());

        let response: PaymasterSupportedTokensResponse = rpc::request(
            transport,
            PM_SUPPORTED_TOKENS,
            vec![json!(request), json!(self.api_key), json!(account.entry_point().address)],
        )
        .await?;
        debug!("SupportedTokens: {:?}", response);
        Ok(response)
    }

    /// Calls `pm_sponsor_userop`; the returned gas limits supersede the bundler's estimates.
    pub async fn get_sponsor_user_op(
        &self,
        transport: &dyn RpcTransport,
        account: Option<&dyn SmartContractAccount>,
        request: &UserOperationStruct,
        context: &PaymasterSponsorContext,
    ) -> Result<PaymasterSponsorUserOpResponse, ClientError> {
        let account = account.ok_or(ClientError::AccountNotFound)?;
        let request = request.with_placeholder_signature(&account.dummy_signature());

        let response: PaymasterSponsorUserOpResponse = rpc::request(
            transport,
            PM_SPONSOR_USEROP,
            vec![
                json!(request),
                json!(self.api_key),
                json!(account.entry_point().address),
                json!(context),
            ],
        )
        .await?;
        debug!("pm_sponsor_userop response: {:?}", response);
        Ok(response)
    }

    /// Entry points the paymaster serves.
    pub async fn entry_points(&self, transport: &dyn RpcTransport) -> Result<Vec<Address>, ClientError> {
        Ok(rpc::request(transport, PM_ENTRYPOINTS, vec![json!("entryPoint")]).await?)
    }
}

/// Merges a sponsorship into `uo`: paymaster data plus the three gas limits.
pub fn apply_sponsorship(
    uo: &mut UserOperationStruct,
    response: &PaymasterSponsorUserOpResponse,
) -> Result<(), ClientError> {
    uo.set_paymaster_and_data(response.paymaster_and_data.clone())?;
    let gas = uo.gas_mut();
    gas.call_gas_limit = response.call_gas_limit;
    gas.verification_gas_limit = response.verification_gas_limit;
    gas.pre_verification_gas = response.pre_verification_gas;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mock_account, v6_user_operation, RecordingTransport, ENTRY_POINT_V6};
    use crate::types::EntryPointVersion;
    use ethers::types::{Bytes, U256};

    const API_KEY: &str = "test-api-key";

    fn actions() -> PaymasterActions {
        PaymasterActions::new(API_KEY, Address::repeat_byte(0x99))
    }

    #[test]
    fn exposes_configured_address() {
        assert_eq!(actions().paymaster_address(), Address::repeat_byte(0x99));
    }

    #[tokio::test]
    async fn requires_an_account() {
        let transport = RecordingTransport::new("http://paymaster");
        let uo = v6_user_operation();

        let err = actions().get_supported_tokens(&transport, None, &uo).await.unwrap_err();
        assert!(matches!(err, ClientError::AccountNotFound));
        let err = actions()
            .get_sponsor_user_op(&transport, None, &uo, &PaymasterSponsorContext::native())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AccountNotFound));
        assert!(transport.methods().is_empty());
    }

    #[tokio::test]
    async fn supported_tokens_is_a_pure_query() {
        let transport = RecordingTransport::new("http://paymaster");
        transport.respond(
            PM_SUPPORTED_TOKENS,
            json!({
                "freeGas": false,
                "native": { "gas": "0x5208", "price": 1.0, "decimals": 18, "symbol": "BTC" },
                "tokens": [{
                    "type": "system",
                    "token": "0xfe9f969faf8ad72a83b761138bf25de87eff9dd2",
                    "symbol": "USDT",
                    "decimals": 6,
                    "price": 65000.5
                }]
            }),
        );
        let account = mock_account(EntryPointVersion::V6);
        let uo = v6_user_operation();
        let before = uo.clone();

        let first = actions().get_supported_tokens(&transport, Some(&account), &uo).await.unwrap();
        let second = actions().get_supported_tokens(&transport, Some(&account), &uo).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(uo, before);
        assert_eq!(first.tokens[0].symbol, "USDT");
        assert!(first.can_sponsor());

        let params = transport.last_params(PM_SUPPORTED_TOKENS).unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params[1], json!(API_KEY));
        assert_eq!(params[2], json!(ENTRY_POINT_V6.parse::<Address>().unwrap()));
        assert_eq!(params[0]["signature"], json!(account.dummy_signature()));
    }

    #[tokio::test]
    async fn sponsor_request_carries_the_sponsor_context() {
        let transport = RecordingTransport::new("http://paymaster");
        transport.respond(
            PM_SPONSOR_USEROP,
            json!({
                "paymasterAndData": "0x9999999999999999999999999999999999999999aa",
                "callGasLimit": "0x249f0",
                "verificationGasLimit": "0x493e0",
                "preVerificationGas": "0xea60"
            }),
        );
        let account = mock_account(EntryPointVersion::V6);
        let token = Address::repeat_byte(0x77);

        let response = actions()
            .get_sponsor_user_op(&transport, Some(&account), &v6_user_operation(), &PaymasterSponsorContext::prefund(token))
            .await
            .unwrap();

        assert_eq!(response.call_gas_limit, U256::from(150_000));
        let params = transport.last_params(PM_SPONSOR_USEROP).unwrap();
        assert_eq!(params.len(), 4);
        assert_eq!(params[3], json!({ "type": "1", "token": token }));
    }

    #[tokio::test]
    async fn entry_points_query_uses_literal_parameter() {
        let transport = RecordingTransport::new("http://paymaster");
        transport.respond(PM_ENTRYPOINTS, json!([ENTRY_POINT_V6]));

        let entry_points = actions().entry_points(&transport).await.unwrap();
        assert_eq!(entry_points, vec![ENTRY_POINT_V6.parse::<Address>().unwrap()]);
        assert_eq!(transport.last_params(PM_ENTRYPOINTS).unwrap(), vec![json!("entryPoint")]);
    }

    #[test]
    fn sponsorship_overwrites_bundler_estimates() {
        let mut uo = v6_user_operation();
        let response = PaymasterSponsorUserOpResponse {
            paymaster_and_data: Bytes::from(vec![0x99; 21]),
            call_gas_limit: U256::from(1),
            verification_gas_limit: U256::from(2),
            pre_verification_gas: U256::from(3),
        };

        apply_sponsorship(&mut uo, &response).unwrap();

        assert_eq!(uo.paymaster_and_data(), Bytes::from(vec![0x99; 21]));
        assert_eq!(uo.gas().call_gas_limit, U256::from(1));
        assert_eq!(uo.gas().verification_gas_limit, U256::from(2));
        assert_eq!(uo.gas().pre_verification_gas, U256::from(3));
        assert!(uo.signature().is_empty());
    }
}
