// src/abi.rs
//! Thin, type-checked layer over the `ethers::abi` codec.
//!
//! Every byte produced here ends up inside a signed hash, so values are
//! checked against their declared types (including `uintN` widths) instead
//! of being silently truncated by the encoder.

use ethers::abi::{self, param_type::Reader, AbiParser, ParamType, Token};
use ethers::types::{Address, U256};
use ethers::utils::to_checksum;

use crate::error::HcError;
use crate::selector::Selector;

/// Parses a canonical parameter list such as `"address,uint256,bytes"`.
///
/// The list is read as one tuple, so nested types like
/// `"(uint256,bytes)[],bool"` are accepted. Anything that does not read back
/// to the same canonical text is rejected.
pub fn parse_types(list: &str) -> Result<Vec<ParamType>, HcError> {
    let list: String = list.split_whitespace().collect();
    if list.is_empty() {
        return Ok(Vec::new());
    }

    let tuple = format!("({list})");
    match Reader::read(&tuple).map_err(|e| HcError::Abi(format!("{list:?}: {e}")))? {
        ParamType::Tuple(types) if ParamType::Tuple(types.clone()).to_string() == tuple => {
            Ok(types)
        }
        _ => Err(HcError::Abi(format!("invalid parameter list {list:?}"))),
    }
}

/// ABI-encodes `values` as a parameter list of `types`.
pub fn encode(types: &[ParamType], values: &[Token]) -> Result<Vec<u8>, HcError> {
    check_all(values, types)?;
    Ok(abi::encode(values))
}

/// Decodes `data` as `types`, rejecting values wider than their declared
/// `uintN`.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, HcError> {
    let tokens = abi::decode(types, data).map_err(|e| HcError::Abi(e.to_string()))?;
    check_all(&tokens, types)?;
    Ok(tokens)
}

/// Like [`decode`], for hex input with or without a `0x` prefix.
pub fn decode_hex(types: &[ParamType], data: &str) -> Result<Vec<Token>, HcError> {
    decode(types, &hex_to_bytes(data)?)
}

/// Selector-prefixed calldata. Token shapes are the caller's responsibility.
pub fn encode_call(selector: Selector, tokens: &[Token]) -> Vec<u8> {
    let mut data = selector.as_bytes().to_vec();
    data.extend(abi::encode(tokens));
    data
}

/// Type-checked calldata for a canonical signature such as
/// `"getNonce(address,uint192)"`.
pub fn encode_function(signature: &str, tokens: &[Token]) -> Result<Vec<u8>, HcError> {
    let function = AbiParser::default()
        .parse_function(signature)
        .map_err(|e| HcError::Abi(format!("not a function signature: {signature:?}: {e}")))?;
    let types: Vec<ParamType> = function.inputs.iter().map(|p| p.kind.clone()).collect();
    let mut data = function.short_signature().to_vec();
    data.extend(encode(&types, tokens)?);
    Ok(data)
}

/// Splits calldata into its selector and argument bytes.
pub fn split_call(data: &[u8]) -> Result<(Selector, &[u8]), HcError> {
    if data.len() < 4 {
        return Err(HcError::Abi(format!(
            "calldata too short for a selector: {} bytes",
            data.len()
        )));
    }
    let selector = Selector::from([data[0], data[1], data[2], data[3]]);
    Ok((selector, &data[4..]))
}

/// Low-order 16 bytes of the 32-byte `uint128` slot for `value`.
pub fn low_u128_bytes(value: U256) -> Result<[u8; 16], HcError> {
    if value.bits() > 128 {
        return Err(HcError::Abi(format!("{value} does not fit in uint128")));
    }
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    let mut out = [0u8; 16];
    out.copy_from_slice(&word[16..]);
    Ok(out)
}

/// Two `uint128` values packed big-endian into one `bytes32`, `high` first.
pub fn pack_u128_pair(high: U256, low: U256) -> Result<[u8; 32], HcError> {
    let mut packed = [0u8; 32];
    packed[..16].copy_from_slice(&low_u128_bytes(high)?);
    packed[16..].copy_from_slice(&low_u128_bytes(low)?);
    Ok(packed)
}

/// Mixed-case (EIP-55) rendering used for display and comparison.
pub fn checksum(address: &Address) -> String {
    to_checksum(address, None)
}

/// Decodes hex with an optional `0x` prefix. Odd-length input is read as if
/// it had one leading zero.
pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, HcError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let result = if digits.len() % 2 == 1 {
        hex::decode(format!("0{digits}"))
    } else {
        hex::decode(digits)
    };
    result.map_err(|e| HcError::Decode(format!("invalid hex {s:?}: {e}")))
}

fn check_all(tokens: &[Token], types: &[ParamType]) -> Result<(), HcError> {
    if tokens.len() != types.len() {
        return Err(HcError::Abi(format!(
            "expected {} values, got {}",
            types.len(),
            tokens.len()
        )));
    }
    tokens.iter().zip(types).try_for_each(|(t, ty)| check(t, ty))
}

fn check(token: &Token, ty: &ParamType) -> Result<(), HcError> {
    match (token, ty) {
        (Token::Address(_), ParamType::Address)
        | (Token::Bool(_), ParamType::Bool)
        | (Token::Bytes(_), ParamType::Bytes)
        | (Token::String(_), ParamType::String)
        | (Token::Int(_), ParamType::Int(_)) => Ok(()),
        (Token::Uint(value), ParamType::Uint(bits)) => {
            if value.bits() > *bits {
                Err(HcError::Abi(format!("{value} does not fit in uint{bits}")))
            } else {
                Ok(())
            }
        }
        (Token::FixedBytes(bytes), ParamType::FixedBytes(len)) => {
            if bytes.len() == *len {
                Ok(())
            } else {
                Err(HcError::Abi(format!(
                    "bytes{len} value has {} bytes",
                    bytes.len()
                )))
            }
        }
        (Token::Array(items), ParamType::Array(inner)) => {
            items.iter().try_for_each(|item| check(item, inner))
        }
        (Token::FixedArray(items), ParamType::FixedArray(inner, len)) => {
            if items.len() != *len {
                return Err(HcError::Abi(format!(
                    "fixed array of {len} has {} items",
                    items.len()
                )));
            }
            items.iter().try_for_each(|item| check(item, inner))
        }
        (Token::Tuple(items), ParamType::Tuple(types)) => check_all(items, types),
        _ => Err(HcError::Abi(format!("value {token:?} is not a {ty}"))),
    }
}
