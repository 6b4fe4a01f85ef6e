// src/response.rs
//! Signed responses for offchain requests.
//!
//! A response is delivered on-chain as a user operation from the hybrid
//! account that calls `HCHelper.PutResponse`. The responder signs that
//! operation's hash up front, so every byte of the calldata and every gas
//! value below is part of what the EntryPoint verifies.

use ethers::abi::{ParamType, Token};
use ethers::types::{Bytes, H256, U256};
use tracing::{debug, info};

use crate::abi::{self, encode_call, pack_u128_pair};
use crate::config::ResponderConfig;
use crate::error::HcError;
use crate::packing::PackedUserOperation;
use crate::request::ParsedRequest;
use crate::selector::{self, Selector};
use crate::types::ServerActionResponse;

pub const VERIFICATION_GAS_LIMIT: u64 = 0x10000;
pub const PRE_VERIFICATION_GAS: u64 = 0x10000;

const GAS_PER_RESPONSE_BYTE: u64 = 705;
const BASE_CALL_GAS: u64 = 170_000;

/// Call gas for a response carrying `payload_len` bytes. Must agree with the
/// value the bundler simulates, or the signed hash no longer matches.
pub fn call_gas_limit(payload_len: usize) -> U256 {
    U256::from(GAS_PER_RESPONSE_BYTE) * U256::from(payload_len) + U256::from(BASE_CALL_GAS)
}

pub struct ResponseGenerator {
    config: ResponderConfig,
}

impl ResponseGenerator {
    pub fn new(config: ResponderConfig) -> Self {
        info!(
            "Initialized response generator with signer {:?} for hybrid account {:?}",
            config.signer_address(),
            config.hybrid_account
        );
        Self { config }
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    /// `execute(helper, 0, PutResponse(skey, abi(srcAddr, srcNonce, errorCode, payload)))`
    pub fn response_call_data(
        &self,
        req: &ParsedRequest,
        error_code: u32,
        payload: &Bytes,
    ) -> Result<Bytes, HcError> {
        let encoded_response = abi::encode(
            &[
                ParamType::Address,
                ParamType::Uint(256),
                ParamType::Uint(32),
                ParamType::Bytes,
            ],
            &[
                Token::Address(req.src_addr),
                Token::Uint(req.src_nonce),
                Token::Uint(U256::from(error_code)),
                Token::Bytes(payload.to_vec()),
            ],
        )?;

        let put_response = encode_call(
            Selector::from_signature(selector::PUT_RESPONSE),
            &[
                Token::FixedBytes(req.skey.to_vec()),
                Token::Bytes(encoded_response),
            ],
        );

        let execute = encode_call(
            Selector::from_signature(selector::EXECUTE),
            &[
                Token::Address(self.config.helper_addr),
                Token::Uint(U256::zero()),
                Token::Bytes(put_response),
            ],
        );
        Ok(Bytes::from(execute))
    }

    fn response_op(
        &self,
        req: &ParsedRequest,
        call_data: Bytes,
        payload_len: usize,
    ) -> Result<PackedUserOperation, HcError> {
        Ok(PackedUserOperation {
            sender: self.config.hybrid_account,
            nonce: req.op_nonce,
            init_code: Bytes::new(),
            call_data,
            account_gas_limits: pack_u128_pair(
                U256::from(VERIFICATION_GAS_LIMIT),
                call_gas_limit(payload_len),
            )?,
            pre_verification_gas: U256::from(PRE_VERIFICATION_GAS),
            gas_fees: [0u8; 32],
            paymaster_and_data: Bytes::new(),
        })
    }

    /// The EntryPoint hash of the response operation, i.e. what gets signed.
    pub fn response_op_hash(
        &self,
        req: &ParsedRequest,
        error_code: u32,
        payload: &Bytes,
    ) -> Result<H256, HcError> {
        let call_data = self.response_call_data(req, error_code, payload)?;
        let op = self.response_op(req, call_data, payload.len())?;
        Ok(op.op_hash(self.config.entry_point, self.config.chain_id))
    }

    pub fn generate_response(
        &self,
        req: &ParsedRequest,
        error_code: u32,
        payload: &Bytes,
    ) -> Result<ServerActionResponse, HcError> {
        let op_hash = self.response_op_hash(req, error_code, payload)?;
        debug!(
            "Signing response for {} nonce {} (error code {}, {} bytes): {:?}",
            req.src_addr_checksum(),
            req.src_nonce,
            error_code,
            payload.len(),
            op_hash
        );

        // Raw hash, no EIP-191 prefix
        let signature = self
            .config
            .signer()
            .sign_hash(op_hash)
            .map_err(|e| HcError::Signing(e.to_string()))?;

        Ok(ServerActionResponse {
            success: error_code == 0,
            response: payload.clone(),
            signature: Bytes::from(signature.to_vec()),
        })
    }
}
