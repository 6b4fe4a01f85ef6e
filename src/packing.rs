// src/packing.rs
//! EntryPoint v0.7 operation hashing.
//!
//! The EntryPoint recomputes `op_hash` on-chain and recovers the signer from
//! it, so the layout here has to match `UserOperationLib.encode` exactly.

use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;

/// The hashed view of a v0.7 `PackedUserOperation` (the signature is not
/// part of the hash and is omitted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedUserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    /// verificationGasLimit (high 16 bytes) ++ callGasLimit (low 16 bytes)
    pub account_gas_limits: [u8; 32],
    pub pre_verification_gas: U256,
    /// maxPriorityFeePerGas (high 16 bytes) ++ maxFeePerGas (low 16 bytes)
    pub gas_fees: [u8; 32],
    pub paymaster_and_data: Bytes,
}

impl PackedUserOperation {
    /// ABI encoding of the operation with its dynamic fields replaced by
    /// their hashes.
    pub fn encode(&self) -> Vec<u8> {
        encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(&self.init_code).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::FixedBytes(self.account_gas_limits.to_vec()),
            Token::Uint(self.pre_verification_gas),
            Token::FixedBytes(self.gas_fees.to_vec()),
            Token::FixedBytes(keccak256(&self.paymaster_and_data).to_vec()),
        ])
    }

    pub fn hash(&self) -> H256 {
        keccak256(self.encode()).into()
    }

    /// `keccak(abi.encode(hash(), entryPoint, chainId))`, the value
    /// `EntryPoint.getUserOpHash` returns.
    pub fn op_hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        keccak256(encode(&[
            Token::FixedBytes(self.hash().as_bytes().to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ]))
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::pack_u128_pair;

    const EMPTY_HASH: &str = "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470";

    fn sample() -> PackedUserOperation {
        PackedUserOperation {
            sender: "0xe320ffca9e2bd1173d041f47fdc197e168fc1ea9".parse().unwrap(),
            nonce: U256::from(7),
            init_code: Bytes::new(),
            call_data: Bytes::from(vec![0xb6, 0x1d, 0x27, 0xf6]),
            account_gas_limits: pack_u128_pair(U256::from(0x10000), U256::from(237_680)).unwrap(),
            pre_verification_gas: U256::from(0x10000),
            gas_fees: [0u8; 32],
            paymaster_and_data: Bytes::new(),
        }
    }

    #[test]
    fn encoding_is_eight_static_slots() {
        let op = sample();
        let encoded = op.encode();
        assert_eq!(encoded.len(), 8 * 32);
        assert_eq!(hex::encode(&encoded[64..96]), EMPTY_HASH);
        assert_eq!(hex::encode(&encoded[224..256]), EMPTY_HASH);
        assert_eq!(&encoded[128..160], &op.account_gas_limits);
    }

    #[test]
    fn op_hash_binds_entry_point_and_chain() {
        let op = sample();
        let ep: Address = "0x0000000071727De22E5E9d8BAf0edAc6f37da032".parse().unwrap();
        let h = op.op_hash(ep, 28882);
        assert_eq!(h, op.op_hash(ep, 28882));
        assert_ne!(h, op.op_hash(ep, 288));
        assert_ne!(h, op.op_hash(Address::zero(), 28882));
        assert_ne!(h, op.hash());
    }

    #[test]
    fn every_field_feeds_the_hash() {
        let base = sample().hash();

        let mut op = sample();
        op.nonce += U256::one();
        assert_ne!(op.hash(), base);

        let mut op = sample();
        op.gas_fees[31] = 1;
        assert_ne!(op.hash(), base);

        let mut op = sample();
        op.paymaster_and_data = Bytes::from(vec![0u8]);
        assert_ne!(op.hash(), base);
    }
}
