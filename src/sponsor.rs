// src/sponsor.rs
//! End-to-end send flow: build, estimate, sponsor when the paymaster allows it,
//! sign, submit, then wait for the bundle transaction.

use ethers::types::H256;
use tracing::{debug, info};

use crate::client::{SmartAccountClient, UserOperationCallData};
use crate::error::{ClientError, SendError, SendStage};
use crate::gas_estimator::UserOperationOverrides;
use crate::paymaster::apply_sponsorship;
use crate::retry::RetryPolicy;
use crate::types::{Call, PaymasterSponsorContext};

#[derive(Debug, Clone)]
pub struct SendUserOperationParams {
    pub tx: Option<Call>,
    pub txs: Option<Vec<Call>>,
    pub sponsor_context: PaymasterSponsorContext,
    pub overrides: Option<UserOperationOverrides>,
    pub retries: RetryPolicy,
}

impl SendUserOperationParams {
    pub fn single(tx: Call, sponsor_context: PaymasterSponsorContext) -> Self {
        Self {
            tx: Some(tx),
            txs: None,
            sponsor_context,
            overrides: None,
            retries: RetryPolicy::default(),
        }
    }

    pub fn batch(txs: Vec<Call>, sponsor_context: PaymasterSponsorContext) -> Self {
        Self {
            tx: None,
            txs: Some(txs),
            sponsor_context,
            overrides: None,
            retries: RetryPolicy::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: UserOperationOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn with_retries(mut self, retries: RetryPolicy) -> Self {
        self.retries = retries;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub user_op_hash: H256,
    pub transaction_hash: H256,
    /// Whether paymaster data was attached before signing.
    pub sponsored: bool,
}

fn at(stage: SendStage) -> impl FnOnce(ClientError) -> SendError {
    move |source| SendError::new(stage, source)
}

/// Runs one user operation through the whole pipeline. Every stage is fail-fast
/// except confirmation, which retries "not mined yet" according to `params.retries`.
pub async fn send_sponsored_user_operation(
    client: &SmartAccountClient,
    params: SendUserOperationParams,
) -> Result<SendOutcome, SendError> {
    let SendUserOperationParams { tx, txs, sponsor_context, overrides, retries } = params;

    let calls = UserOperationCallData::from_parts(tx, txs).map_err(at(SendStage::Building))?;
    retries.validate().map_err(at(SendStage::Building))?;
    let entry_point = client.account().map_err(at(SendStage::Building))?.entry_point();

    debug!("Building user operation on {}", client.chain().name);
    let uo = client.prepare_user_operation(&calls).await.map_err(at(SendStage::Building))?;

    let mut uo = client
        .estimate_user_operation(uo, overrides.as_ref())
        .await
        .map_err(at(SendStage::Estimating))?;
    debug!("Estimated gas: {:?}", uo.gas());

    let supported = client
        .get_supported_tokens(&uo)
        .await
        .map_err(at(SendStage::CheckingSponsorship))?;

    let sponsored = supported.can_sponsor();
    if sponsored {
        let response = client
            .get_sponsor_user_op(&uo, &sponsor_context)
            .await
            .map_err(at(SendStage::Sponsoring))?;
        apply_sponsorship(&mut uo, &response).map_err(at(SendStage::Sponsoring))?;
        info!("Paymaster {:?} sponsoring user operation", client.paymaster_address());
    } else {
        info!("Paymaster declined sponsorship, sending without paymaster data");
    }

    let signed = client.sign_user_operation(&uo).await.map_err(at(SendStage::Signing))?;

    let user_op_hash = client
        .send_raw_user_operation(&signed, entry_point.address)
        .await
        .map_err(at(SendStage::Submitting))?;

    let transaction_hash = client
        .wait_for_user_operation_transaction(user_op_hash, &retries)
        .await
        .map_err(at(SendStage::Confirming))?;

    Ok(SendOutcome { user_op_hash, transaction_hash, sponsored })
}
