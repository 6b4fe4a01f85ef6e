// src/userop.rs
use std::future::Future;
use std::sync::Arc;

use ethers::abi::{ParamType, Token};
use ethers::middleware::SignerMiddleware;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::abi::{self, encode_function};
use crate::config::{
    UserOpManagerConfig, BUNDLER_RPC, ENTRY_POINT_V07, HYBRID_ACCOUNT_FACTORY, RPC_URL,
    SIMPLE_ACCOUNT_FACTORY,
};
use crate::error::HcError;
use crate::selector;
use crate::types::{
    AccountType, CreateResult, CreateSmartAccountParams, EstimateOutcome, GasEstimate,
    GetExpectedAddressParams, UserOperationReceipt, UserOperationV7, DUMMY_SIGNATURE,
};

/// 0.5 gwei
pub const MIN_PRIORITY_FEE: u64 = 500_000_000;
/// Placeholder until the bundler estimates it
const INITIAL_PRE_VERIFICATION_GAS: u64 = 45_000;

/// Tip above `baseline`, never below [`MIN_PRIORITY_FEE`].
///
/// `build_op` measures against the current gas price itself, so in practice
/// the tip is always the floor.
pub fn priority_fee(gas_price: U256, baseline: U256) -> U256 {
    gas_price
        .saturating_sub(baseline)
        .max(U256::from(MIN_PRIORITY_FEE))
}

/// `max(gas_price, 2 * base_fee + tip)` with `base_fee = gas_price - tip`.
/// A tip above the gas price leaves the gas price unchanged.
pub fn max_fee(gas_price: U256, tip: U256) -> U256 {
    match gas_price.checked_sub(tip) {
        Some(base_fee) => gas_price.max(base_fee * 2 + tip),
        None => gas_price,
    }
}

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Builds, signs and submits user operations for smart accounts owned by the
/// configured key, and deploys new accounts through the account factories.
pub struct UserOpManager {
    config: UserOpManagerConfig,
    client: Arc<Provider<Http>>,
    bundler: Provider<Http>,
}

impl UserOpManager {
    pub fn new(config: UserOpManagerConfig) -> Result<Self, HcError> {
        let mut client = Provider::<Http>::try_from(config.node_url.as_str())
            .map_err(|e| HcError::invalid_config(RPC_URL, e))?;
        if let Some(interval) = config.confirmation_interval {
            client = client.interval(interval);
        }
        let bundler = Provider::<Http>::try_from(config.bundler_url.as_str())
            .map_err(|e| HcError::invalid_config(BUNDLER_RPC, e))?;

        info!(
            "Initialized user operation manager for {:?} on chain {} (entry point {:?})",
            config.signer().address(),
            config.chain_id,
            config.entry_point
        );

        Ok(Self {
            config,
            client: Arc::new(client),
            bundler,
        })
    }

    pub fn entry_point(&self) -> Address {
        self.config.entry_point
    }

    pub fn node_url(&self) -> &str {
        &self.config.node_url
    }

    pub fn bundler_url(&self) -> &str {
        &self.config.bundler_url
    }

    pub fn is_v7_entry_point(&self) -> bool {
        self.config.entry_point == ENTRY_POINT_V07
    }

    pub fn signer_address(&self) -> Address {
        self.config.signer().address()
    }

    /// Configured override, else the deployment known for the chain.
    pub fn account_factory_address(&self, account_type: AccountType) -> Result<Address, HcError> {
        let network = self.config.network();
        match account_type {
            AccountType::Simple => self
                .config
                .simple_account_factory
                .or_else(|| network.map(|n| n.simple_account_factory()))
                .ok_or(HcError::MissingConfig(SIMPLE_ACCOUNT_FACTORY)),
            AccountType::Hybrid => self
                .config
                .hybrid_account_factory
                .or_else(|| network.map(|n| n.hybrid_account_factory()))
                .ok_or(HcError::MissingConfig(HYBRID_ACCOUNT_FACTORY)),
        }
    }

    async fn read(&self, to: Address, data: Vec<u8>, output: ParamType) -> Result<Token, HcError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        let raw = self
            .client
            .call(&tx, None)
            .await
            .map_err(|e| HcError::Provider(e.to_string()))?;
        abi::decode(&[output], &raw)?
            .pop()
            .ok_or_else(|| HcError::Abi(format!("empty result from {to:?}")))
    }

    /// Current EntryPoint nonce of `sender` in the `key` namespace.
    pub async fn get_nonce(&self, sender: Address, key: U256) -> Result<U256, HcError> {
        let data = encode_function(
            selector::GET_NONCE,
            &[Token::Address(sender), Token::Uint(key)],
        )?;
        self.read(self.config.entry_point, data, ParamType::Uint(256))
            .await?
            .into_uint()
            .ok_or_else(|| HcError::Abi("getNonce did not return a uint".to_string()))
    }

    /// An unsigned, un-estimated operation from `sender` executing
    /// `target.call{value}(call_data)`.
    pub async fn build_op(
        &self,
        sender: Address,
        target: Address,
        value: U256,
        call_data: Bytes,
        nonce_key: U256,
    ) -> Result<UserOperationV7, HcError> {
        let gas_price = self
            .client
            .get_gas_price()
            .await
            .map_err(|e| HcError::Provider(e.to_string()))?;
        let tip = priority_fee(gas_price, gas_price);
        let fee = max_fee(gas_price, tip);

        let execute = encode_function(
            selector::EXECUTE,
            &[
                Token::Address(target),
                Token::Uint(value),
                Token::Bytes(call_data.to_vec()),
            ],
        )?;
        let nonce = self.get_nonce(sender, nonce_key).await?;

        let mut op = UserOperationV7 {
            sender,
            nonce,
            call_data: Bytes::from(execute),
            call_gas_limit: U256::zero(),
            verification_gas_limit: U256::zero(),
            pre_verification_gas: U256::from(INITIAL_PRE_VERIFICATION_GAS),
            max_fee_per_gas: fee,
            max_priority_fee_per_gas: tip,
            signature: Bytes::from(DUMMY_SIGNATURE.to_vec()),
            paymaster_and_data: Some(Bytes::new()),
            account_gas_limits: H256::zero(),
            gas_fees: H256::zero(),
        };
        op.refresh_packed_gas()?;

        debug!(
            "Built operation for {:?} nonce {} (gas price {}, tip {}, max fee {})",
            sender, nonce, gas_price, tip, fee
        );
        Ok(op)
    }

    /// Asks the bundler for gas limits. On any failure, including a reply
    /// missing a limit or estimating zero call or verification gas, the
    /// operation comes back untouched with `success == false`.
    pub async fn estimate_op(&self, op: UserOperationV7) -> EstimateOutcome {
        let estimate = self
            .bundler
            .request::<_, GasEstimate>(
                "eth_estimateUserOperationGas",
                (&op, self.config.entry_point),
            )
            .await;

        let estimate = match estimate {
            Ok(estimate) => estimate,
            Err(e) => {
                error!("Gas estimation failed for {:?}: {}", op.sender, e);
                return EstimateOutcome { success: false, op };
            }
        };

        let (pre_verification_gas, verification_gas_limit, call_gas_limit) = match (
            estimate.pre_verification_gas,
            estimate.verification_gas_limit,
            estimate.call_gas_limit,
        ) {
            (Some(pvg), Some(verification), Some(call))
                if !verification.is_zero() && !call.is_zero() =>
            {
                (pvg, verification, call)
            }
            _ => {
                error!(
                    "Incomplete gas estimate for {:?}: {:?}",
                    op.sender, estimate
                );
                return EstimateOutcome { success: false, op };
            }
        };

        let mut estimated = op.clone();
        estimated.pre_verification_gas = pre_verification_gas;
        estimated.verification_gas_limit = verification_gas_limit;
        estimated.call_gas_limit = call_gas_limit;
        if let Err(e) = estimated.refresh_packed_gas() {
            error!("Unusable gas estimate for {:?}: {}", op.sender, e);
            return EstimateOutcome { success: false, op };
        }

        info!(
            "Estimated gas for {:?}: preVerification {}, verification {}, call {}",
            op.sender,
            estimated.pre_verification_gas,
            estimated.verification_gas_limit,
            estimated.call_gas_limit
        );
        EstimateOutcome {
            success: true,
            op: estimated,
        }
    }

    /// EntryPoint hash of `op` for this manager's entry point and chain.
    pub fn op_hash(&self, op: &UserOperationV7) -> Result<H256, HcError> {
        Ok(op
            .packed()?
            .op_hash(self.config.entry_point, self.config.chain_id))
    }

    /// Signs the operation hash as a personal message, which is what the
    /// owner check in the deployed accounts recovers against.
    pub async fn sign_op(&self, mut op: UserOperationV7) -> Result<UserOperationV7, HcError> {
        op.refresh_packed_gas()?;
        let hash = self.op_hash(&op)?;
        let signature = self
            .config
            .signer()
            .sign_message(hash.as_bytes())
            .await
            .map_err(|e| HcError::Signing(e.to_string()))?;
        op.signature = Bytes::from(signature.to_vec());
        Ok(op)
    }

    pub async fn submit_op(&self, op: &UserOperationV7) -> Result<H256, HcError> {
        let op_hash = self
            .bundler
            .request::<_, H256>("eth_sendUserOperation", (op, self.config.entry_point))
            .await
            .map_err(|e| HcError::SubmissionFailed(e.to_string()))?;
        info!("Submitted operation {:?} for {:?}", op_hash, op.sender);
        Ok(op_hash)
    }

    /// Polls the bundler until the operation is included, the attempt budget
    /// runs out, or `cancel` fires. Each attempt waits one interval first.
    pub async fn wait_for_receipt(
        &self,
        op_hash: H256,
        cancel: &CancellationToken,
    ) -> Result<UserOperationReceipt, HcError> {
        let polling = self.config.receipt_polling;
        for attempt in 1..=polling.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HcError::Cancelled),
                _ = tokio::time::sleep(polling.interval) => {}
            }

            let receipt = self
                .bundler
                .request::<_, Option<UserOperationReceipt>>("eth_getUserOperationReceipt", [op_hash])
                .await;
            match receipt {
                Ok(Some(receipt)) if receipt.succeeded() => {
                    info!(
                        "Operation {:?} included in {:?}",
                        op_hash, receipt.receipt.transaction_hash
                    );
                    return Ok(receipt);
                }
                Ok(Some(receipt)) => {
                    error!(
                        "Operation {:?} failed on-chain: {}",
                        op_hash,
                        receipt.reason.as_deref().unwrap_or("no reason given")
                    );
                    return Err(HcError::OperationFailed {
                        op_hash,
                        tx_hash: receipt.receipt.transaction_hash,
                    });
                }
                Ok(None) => debug!("No receipt for {:?} yet (attempt {})", op_hash, attempt),
                Err(e) => warn!(
                    "Failed to fetch receipt for {:?} (attempt {}): {}",
                    op_hash, attempt, e
                ),
            }
        }
        Err(HcError::ReceiptTimeout {
            op_hash,
            attempts: polling.max_attempts,
        })
    }

    pub async fn sign_submit_op(
        &self,
        op: UserOperationV7,
        cancel: &CancellationToken,
    ) -> Result<UserOperationReceipt, HcError> {
        let signed = self.sign_op(op).await?;
        let op_hash = self.submit_op(&signed).await?;
        self.wait_for_receipt(op_hash, cancel).await
    }

    async fn counterfactual_address(
        &self,
        factory: Address,
        owner: Address,
        salt: U256,
    ) -> Result<Address, HcError> {
        let data = encode_function(
            selector::GET_ADDRESS,
            &[Token::Address(owner), Token::Uint(salt)],
        )?;
        self.read(factory, data, ParamType::Address)
            .await?
            .into_address()
            .ok_or_else(|| HcError::Abi("getAddress did not return an address".to_string()))
    }

    /// Address the factory would deploy for the manager's signer and `salt`.
    pub async fn get_expected_address(
        &self,
        params: GetExpectedAddressParams,
    ) -> Result<Address, HcError> {
        let factory = self.account_factory_address(params.account_type)?;
        self.counterfactual_address(factory, self.signer_address(), params.salt)
            .await
    }

    /// Deploys an account for `owner` (the signer by default) and funds it.
    pub async fn create_smart_account(
        &self,
        params: CreateSmartAccountParams,
    ) -> Result<CreateResult, HcError> {
        let owner = params.owner.unwrap_or_else(|| self.signer_address());
        let factory = self.account_factory_address(params.account_type)?;
        let address = self
            .counterfactual_address(factory, owner, params.salt)
            .await?;
        info!(
            "Creating {:?} account {:?} for owner {:?} (salt {})",
            params.account_type, address, owner, params.salt
        );

        let client = SignerMiddleware::new(
            self.client.as_ref().clone(),
            self.config.signer().clone(),
        );
        let data = encode_function(
            selector::CREATE_ACCOUNT,
            &[Token::Address(owner), Token::Uint(params.salt)],
        )?;
        let tx = TransactionRequest::new().to(factory).data(data);
        let receipt = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| HcError::Provider(e.to_string()))?
            .await
            .map_err(|e| HcError::Provider(e.to_string()))?;

        let client = &client;
        let fund_hash =
            retry_on_nonce_collision("fund new account", || self.fund(client, address)).await?;
        info!(
            "Funded {:?} with {} wei: {:?}",
            address, self.config.funding_amount, fund_hash
        );

        Ok(CreateResult { address, receipt })
    }

    async fn fund(&self, client: &SignerClient, account: Address) -> Result<H256, HcError> {
        let nonce = client
            .get_transaction_count(self.signer_address(), Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| HcError::Provider(e.to_string()))?;
        let tx = TransactionRequest::new()
            .to(account)
            .value(self.config.funding_amount)
            .nonce(nonce);
        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| HcError::Provider(e.to_string()))?;
        let hash = pending.tx_hash();
        pending
            .await
            .map_err(|e| HcError::Provider(e.to_string()))?;
        Ok(hash)
    }

    /// Reads `owner()` from `contract`.
    pub async fn get_owner(&self, contract: Address) -> Result<Address, HcError> {
        let data = encode_function(selector::OWNER, &[])?;
        self.read(contract, data, ParamType::Address)
            .await?
            .into_address()
            .ok_or_else(|| HcError::Abi("owner() did not return an address".to_string()))
    }
}

fn is_nonce_collision(err: &HcError) -> bool {
    matches!(err, HcError::Provider(msg) if msg.to_lowercase().contains("nonce too low"))
}

/// Runs `send` and, if it failed with a nonce collision, once more. `send`
/// is expected to fetch its nonce afresh on every call.
async fn retry_on_nonce_collision<F, Fut, T>(description: &str, send: F) -> Result<T, HcError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, HcError>>,
{
    match send().await {
        Err(e) if is_nonce_collision(&e) => {
            warn!("Failed to {description} ({e}), retrying with a fresh nonce");
            send().await
        }
        other => other,
    }
}
