// src/types.rs
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256, U64};
use serde::{Deserialize, Serialize};

use crate::abi::pack_u128_pair;
use crate::error::HcError;
use crate::packing::PackedUserOperation;

/// Placeholder signature accepted by bundlers during gas estimation.
pub const DUMMY_SIGNATURE: [u8; 65] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xf0,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x7a, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
    0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
    0x1c,
];

/// EntryPoint v0.7 user operation in the JSON shape bundlers accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV7 {
    pub sender: Address,
    pub nonce: U256,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub signature: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_and_data: Option<Bytes>,
    pub account_gas_limits: H256,
    pub gas_fees: H256,
}

impl UserOperationV7 {
    /// Recomputes `account_gas_limits` and `gas_fees` from the scalar gas
    /// fields. Fails if any of them is wider than 128 bits.
    pub fn refresh_packed_gas(&mut self) -> Result<(), HcError> {
        self.account_gas_limits =
            H256(pack_u128_pair(self.verification_gas_limit, self.call_gas_limit)?);
        self.gas_fees = H256(pack_u128_pair(
            self.max_priority_fee_per_gas,
            self.max_fee_per_gas,
        )?);
        Ok(())
    }

    /// Hashed view of the operation. Packed gas values are derived from the
    /// scalar fields, not taken from the stored packed copies.
    pub fn packed(&self) -> Result<PackedUserOperation, HcError> {
        Ok(PackedUserOperation {
            sender: self.sender,
            nonce: self.nonce,
            init_code: Bytes::new(),
            call_data: self.call_data.clone(),
            account_gas_limits: pack_u128_pair(self.verification_gas_limit, self.call_gas_limit)?,
            pre_verification_gas: self.pre_verification_gas,
            gas_fees: pack_u128_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas)?,
            paymaster_and_data: self.paymaster_and_data.clone().unwrap_or_default(),
        })
    }
}

/// Result of `eth_estimateUserOperationGas`. An estimate missing any field
/// is treated as a failed estimate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    #[serde(default)]
    pub pre_verification_gas: Option<U256>,
    #[serde(default)]
    pub verification_gas_limit: Option<U256>,
    #[serde(default)]
    pub call_gas_limit: Option<U256>,
}

#[derive(Debug, Clone)]
pub struct EstimateOutcome {
    pub success: bool,
    pub op: UserOperationV7,
}

impl EstimateOutcome {
    /// Turns an unsuccessful estimate into [`HcError::EstimationFailed`] so an
    /// un-estimated operation can't reach `sign_submit_op` by accident.
    pub fn into_result(self) -> Result<UserOperationV7, HcError> {
        if self.success {
            Ok(self.op)
        } else {
            Err(HcError::EstimationFailed(format!(
                "bundler rejected estimation for sender {:?}",
                self.op.sender
            )))
        }
    }
}

/// Transaction part of a user operation receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleTransactionReceipt {
    pub transaction_hash: H256,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub status: Option<U64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    #[serde(default)]
    pub sender: Option<Address>,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub actual_gas_used: Option<U256>,
    pub receipt: BundleTransactionReceipt,
}

impl UserOperationReceipt {
    /// `success` must hold and the bundle transaction must not have reverted.
    /// A receipt without a transaction status defers to `success`.
    pub fn succeeded(&self) -> bool {
        self.success && self.receipt.status.map_or(true, |status| status == U64::one())
    }
}

/// Signed answer to one offchain request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerActionResponse {
    pub success: bool,
    pub response: Bytes,
    /// 65 bytes, r ++ s ++ v
    pub signature: Bytes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccountType {
    #[default]
    Simple,
    Hybrid,
}

#[derive(Debug, Clone, Default)]
pub struct GetExpectedAddressParams {
    pub salt: U256,
    pub account_type: AccountType,
}

#[derive(Debug, Clone, Default)]
pub struct CreateSmartAccountParams {
    pub salt: U256,
    /// Defaults to the manager's signer address
    pub owner: Option<Address>,
    pub account_type: AccountType,
}

#[derive(Debug, Clone)]
pub struct CreateResult {
    pub address: Address,
    pub receipt: Option<TransactionReceipt>,
}
