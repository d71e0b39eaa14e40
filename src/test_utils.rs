// src/test_utils.rs
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use serde_json::{json, Value};

use crate::account::MockSmartContractAccount;
use crate::client::SmartAccountClient;
use crate::config::SmartAccountConfig;
use crate::error::TransportError;
use crate::paymaster::PaymasterActions;
use crate::rpc::{ETH_ESTIMATE_USER_OPERATION_GAS, ETH_GET_BLOCK_BY_NUMBER, ETH_MAX_PRIORITY_FEE_PER_GAS};
use crate::transport::RpcTransport;
use crate::types::{
    Chain, EntryPoint, EntryPointVersion, FeeFields, GasFields, UserOperationStruct,
    UserOperationV6,
};

pub const ENTRY_POINT_V6: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
pub const ENTRY_POINT_V7: &str = "0x0000000071727De22E5E9d8BAf0edAc6f37da032";
pub const TEST_API_KEY: &str = "test-api-key";
pub const BITLAYER_TESTNET_ID: u64 = 200810;

/// Call order shared between fakes, e.g. transports and the signing account.
pub type CallLog = Arc<Mutex<Vec<String>>>;

enum Scripted {
    Ok(Value),
    Err(TransportError),
}

impl Scripted {
    fn replay(&self) -> Result<Value, TransportError> {
        match self {
            Scripted::Ok(value) => Ok(value.clone()),
            Scripted::Err(TransportError::Rpc { code, message, data }) => Err(TransportError::Rpc {
                code: *code,
                message: message.clone(),
                data: data.clone(),
            }),
            Scripted::Err(other) => Err(TransportError::Transport(other.to_string())),
        }
    }
}

/// In-memory transport answering from per-method scripts. The last scripted
/// answer for a method repeats once the queue is down to it.
pub struct RecordingTransport {
    endpoint: String,
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    log: CallLog,
}

impl RecordingTransport {
    pub fn new(endpoint: &str) -> Self {
        Self::with_log(endpoint, CallLog::default())
    }

    pub fn with_log(endpoint: &str, log: CallLog) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn respond(&self, method: &str, value: Value) {
        self.push(method, Scripted::Ok(value));
    }

    pub fn fail(&self, method: &str, error: TransportError) {
        self.push(method, Scripted::Err(error));
    }

    /// Drops everything scripted for `method` so far.
    pub fn reset(&self, method: &str) {
        self.scripts.lock().unwrap().remove(method);
    }

    fn push(&self, method: &str, scripted: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(scripted);
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(m, _)| m == method).count()
    }

    /// Parameters of the most recent call to `method`.
    pub fn last_params(&self, method: &str) -> Option<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
    }
}

#[async_trait]
impl RpcTransport for RecordingTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push((method.to_string(), params));
        self.log.lock().unwrap().push(method.to_string());

        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(method).ok_or_else(|| TransportError::Rpc {
            code: -32601,
            message: format!("method {} not scripted", method),
            data: None,
        })?;
        if queue.len() > 1 {
            queue.pop_front().map(|s| s.replay()).unwrap_or(Ok(Value::Null))
        } else {
            queue.front().map(|s| s.replay()).unwrap_or(Ok(Value::Null))
        }
    }
}

pub fn test_chain() -> Chain {
    Chain {
        id: BITLAYER_TESTNET_ID,
        name: "Bitlayer Testnet".to_string(),
        rpc_url: "https://testnet-rpc.bitlayer.org".to_string(),
        explorer_url: Some("https://testnet.btrscan.com".to_string()),
    }
}

pub fn test_config() -> SmartAccountConfig {
    SmartAccountConfig {
        bundler_url: "http://127.0.0.1:3000/bundler".to_string(),
        paymaster_url: "http://127.0.0.1:3000/paymaster".to_string(),
        paymaster_address: Address::repeat_byte(0x99),
        api_key: TEST_API_KEY.to_string(),
        factory_address: Address::repeat_byte(0xfa),
        factory_version: "v1.1.0".to_string(),
    }
}

fn entry_point(version: EntryPointVersion) -> EntryPoint {
    let address = match version {
        EntryPointVersion::V6 => ENTRY_POINT_V6,
        EntryPointVersion::V7 => ENTRY_POINT_V7,
    };
    EntryPoint { address: address.parse().unwrap(), version }
}

/// Deployed account on `version`; signing is left for each test to script.
pub fn mock_account(version: EntryPointVersion) -> MockSmartContractAccount {
    mock_account_with(version, true, Bytes::new())
}

pub fn mock_account_with(
    version: EntryPointVersion,
    deployed: bool,
    init_code: Bytes,
) -> MockSmartContractAccount {
    let mut account = MockSmartContractAccount::new();
    account.expect_address().return_const(Address::repeat_byte(0x11));
    account.expect_entry_point().returning(move || entry_point(version));
    account
        .expect_dummy_signature()
        .returning(|| Bytes::from(vec![0xff; 65]));
    account.expect_is_deployed().returning(move || Ok(deployed));
    account.expect_get_nonce().returning(|| Ok(U256::from(3)));
    account.expect_get_init_code().returning(move || Ok(init_code.clone()));
    account.expect_encode_execute().returning(|call| {
        let mut data = vec![0xb6, 0x1d, 0x27, 0xf6];
        data.extend_from_slice(call.target.as_bytes());
        Ok(Bytes::from(data))
    });
    account.expect_encode_batch_execute().returning(|calls| {
        let mut data = vec![0x47, 0xe1, 0xda, 0x2a];
        for call in calls {
            data.extend_from_slice(call.target.as_bytes());
        }
        Ok(Bytes::from(data))
    });
    account
}

/// Scripts the node and bundler reads the estimators depend on.
pub fn script_node(transport: &RecordingTransport) {
    transport.respond(ETH_GET_BLOCK_BY_NUMBER, json!({ "number": "0x1", "baseFeePerGas": "0x3b9aca00" }));
    transport.respond(ETH_MAX_PRIORITY_FEE_PER_GAS, json!("0x5f5e100"));
    transport.respond(
        ETH_ESTIMATE_USER_OPERATION_GAS,
        json!({
            "callGasLimit": "0x186a0",
            "verificationGasLimit": "0x30d40",
            "preVerificationGas": "0xc350"
        }),
    );
}

pub fn test_client(
    transport: Arc<RecordingTransport>,
    account: MockSmartContractAccount,
) -> SmartAccountClient {
    SmartAccountClient::new(
        test_chain(),
        transport,
        Some(Arc::new(account)),
        PaymasterActions::new(TEST_API_KEY, Address::repeat_byte(0x99)),
    )
}

pub fn v6_user_operation() -> UserOperationStruct {
    UserOperationStruct::V6(UserOperationV6 {
        sender: Address::repeat_byte(0x11),
        nonce: U256::from(3),
        init_code: Bytes::new(),
        call_data: Bytes::from(vec![0xb6, 0x1d, 0x27, 0xf6]),
        gas: GasFields {
            call_gas_limit: U256::from(100_000),
            verification_gas_limit: U256::from(200_000),
            pre_verification_gas: U256::from(50_000),
        },
        fees: FeeFields {
            max_fee_per_gas: U256::from(1_300_000_000u64),
            max_priority_fee_per_gas: U256::from(100_000_000u64),
        },
        paymaster_and_data: Bytes::new(),
        signature: Bytes::new(),
    })
}

pub fn mined_receipt(user_op_hash: H256, transaction_hash: H256) -> Value {
    json!({
        "userOpHash": user_op_hash,
        "entryPoint": ENTRY_POINT_V6,
        "sender": Address::repeat_byte(0x11),
        "nonce": "0x3",
        "actualGasCost": "0x2386f26fc10000",
        "actualGasUsed": "0x3d090",
        "success": true,
        "receipt": {
            "transactionHash": transaction_hash,
            "blockHash": H256::repeat_byte(0x0b),
            "blockNumber": "0x1b4"
        }
    })
}
