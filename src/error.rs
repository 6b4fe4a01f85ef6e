// src/error.rs
use ethers::types::H256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HcError {
    #[error("Missing required configuration value: {0}")]
    MissingConfig(&'static str),

    #[error("Invalid configuration value for {var}: {reason}")]
    InvalidConfig { var: &'static str, reason: String },

    #[error("Malformed offchain request: {0}")]
    Decode(String),

    #[error("ABI codec error: {0}")]
    Abi(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Gas estimation failed: {0}")]
    EstimationFailed(String),

    #[error("UserOperation submission failed: {0}")]
    SubmissionFailed(String),

    #[error("No receipt for UserOperation {op_hash:?} after {attempts} attempts")]
    ReceiptTimeout { op_hash: H256, attempts: u32 },

    #[error("UserOperation {op_hash:?} failed on-chain (tx {tx_hash:?})")]
    OperationFailed { op_hash: H256, tx_hash: H256 },

    #[error("Ethereum provider error: {0}")]
    Provider(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl HcError {
    pub(crate) fn invalid_config(var: &'static str, reason: impl ToString) -> Self {
        HcError::InvalidConfig {
            var,
            reason: reason.to_string(),
        }
    }

    /// Configuration problems are fatal and never worth retrying.
    pub fn is_config(&self) -> bool {
        matches!(self, HcError::MissingConfig(_) | HcError::InvalidConfig { .. })
    }
}
