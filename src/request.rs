// src/request.rs
use ethers::abi::Token;
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::abi::{self, checksum, hex_to_bytes};
use crate::error::HcError;

/// Parameters of an inbound offchain call, exactly as they arrive on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainParameter {
    pub ver: String,
    pub sk: String,
    pub src_addr: String,
    /// Hex, normally without a `0x` prefix
    pub src_nonce: String,
    /// `0x`-prefixed hex
    pub oo_nonce: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub version: String,
    pub skey: [u8; 32],
    pub src_addr: Address,
    pub src_nonce: U256,
    pub op_nonce: U256,
    pub req_bytes: Bytes,
}

impl ParsedRequest {
    /// EIP-55 form of `src_addr`.
    pub fn src_addr_checksum(&self) -> String {
        checksum(&self.src_addr)
    }

    /// Decodes the request payload as the parameter list `types`,
    /// e.g. `"uint32,uint32"`.
    pub fn decode_payload(&self, types: &str) -> Result<Vec<Token>, HcError> {
        abi::decode(&abi::parse_types(types)?, &self.req_bytes)
    }
}

/// Normalizes an [`OffchainParameter`] into typed values. Any malformed
/// field rejects the whole request.
pub fn get_parsed_request(param: &OffchainParameter) -> Result<ParsedRequest, HcError> {
    let skey = left_pad::<32>("sk", &param.sk)?;
    let src_addr = Address::from(left_pad::<20>("src_addr", &param.src_addr)?);
    let src_nonce = parse_hex_u256("src_nonce", &param.src_nonce)?;
    let op_nonce = parse_hex_u256("oo_nonce", &param.oo_nonce)?;
    let req_bytes = Bytes::from(field_bytes("payload", &param.payload)?);

    Ok(ParsedRequest {
        version: param.ver.clone(),
        skey,
        src_addr,
        src_nonce,
        op_nonce,
        req_bytes,
    })
}

fn left_pad<const N: usize>(field: &str, value: &str) -> Result<[u8; N], HcError> {
    let bytes = field_bytes(field, value)?;
    if bytes.len() > N {
        return Err(HcError::Decode(format!(
            "{field} is {} bytes, at most {N} allowed",
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out[N - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

fn field_bytes(field: &str, value: &str) -> Result<Vec<u8>, HcError> {
    hex_to_bytes(value).map_err(|_| HcError::Decode(format!("{field} is not valid hex: {value:?}")))
}

fn parse_hex_u256(field: &str, value: &str) -> Result<U256, HcError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() {
        return Err(HcError::Decode(format!("{field} is empty")));
    }
    U256::from_str_radix(digits, 16).map_err(|e| HcError::Decode(format!("{field} {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_param() -> OffchainParameter {
        OffchainParameter {
            ver: "0.3".to_string(),
            sk: "0x92ca68dd4634511b7d08a8ecac91171835546f11014d60e5117acb395fbe54cd".to_string(),
            src_addr: "f40d61fb6a4f4e8658661c113c630c66fffb6670".to_string(),
            src_nonce: "0000000000000000000000000000000000000000000000000000000000000002"
                .to_string(),
            oo_nonce: "0x3e8a6c2d1f6b2e5a00000000000000000000000000000000000000001".to_string(),
            payload: "0x0000000000000000000000000000000000000000000000000000000000000005\
                      0000000000000000000000000000000000000000000000000000000000000003"
                .to_string(),
        }
    }

    #[test]
    fn parses_wire_fields() {
        let req = get_parsed_request(&sample_param()).unwrap();
        assert_eq!(req.version, "0.3");
        assert_eq!(
            hex::encode(req.skey),
            "92ca68dd4634511b7d08a8ecac91171835546f11014d60e5117acb395fbe54cd"
        );
        assert_eq!(req.src_nonce, U256::from(2));
        assert!(req.op_nonce > U256::from(u64::MAX));
        assert_eq!(req.req_bytes.len(), 64);
    }

    #[test]
    fn checksum_ignores_input_case() {
        let mut upper = sample_param();
        upper.src_addr = "0xF40D61FB6A4F4E8658661C113C630C66FFFB6670".to_string();
        let a = get_parsed_request(&sample_param()).unwrap().src_addr_checksum();
        let b = get_parsed_request(&upper).unwrap().src_addr_checksum();
        assert_eq!(a, b);
        assert_eq!(a, "0xf40d61fb6a4F4E8658661C113C630c66FFFb6670");
        assert_eq!(a.len(), 42);
        assert!(a[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn short_values_are_left_padded() {
        let mut param = sample_param();
        param.sk = "0x01".to_string();
        param.src_addr = "0xabc".to_string();
        param.src_nonce = "a".to_string();
        let req = get_parsed_request(&param).unwrap();
        let mut skey = [0u8; 32];
        skey[31] = 1;
        assert_eq!(req.skey, skey);
        assert_eq!(
            req.src_addr,
            "0x0000000000000000000000000000000000000abc".parse::<Address>().unwrap()
        );
        assert_eq!(req.src_nonce, U256::from(10));
    }

    #[test]
    fn malformed_fields_are_decode_errors() {
        let cases: [(fn(&mut OffchainParameter), &str); 5] = [
            (|p| p.sk = "0xzz".to_string(), "sk"),
            (|p| p.sk = format!("0x{}", "11".repeat(33)), "sk"),
            (|p| p.src_addr = "not-an-address".to_string(), "src_addr"),
            (|p| p.src_nonce = "twelve".to_string(), "src_nonce"),
            (|p| p.oo_nonce = "0x".to_string(), "oo_nonce"),
        ];
        for (mutate, field) in cases {
            let mut param = sample_param();
            mutate(&mut param);
            match get_parsed_request(&param) {
                Err(HcError::Decode(msg)) => assert!(msg.contains(field), "{msg}"),
                other => panic!("{field}: expected decode error, got {other:?}"),
            }
        }
    }

    #[test]
    fn decode_payload_as_declared_types() {
        let req = get_parsed_request(&sample_param()).unwrap();
        let tokens = req.decode_payload("uint32,uint32").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Uint(U256::from(5u64)), Token::Uint(U256::from(3u64))]
        );
        assert!(req.decode_payload("uint32,uint32,bytes").is_err());
    }

    #[test]
    fn wire_form_deserializes() {
        let param: OffchainParameter = serde_json::from_str(
            r#"{"ver":"0.3","sk":"0x01","src_addr":"0x01","src_nonce":"01","oo_nonce":"0x01","payload":"0x"}"#,
        )
        .unwrap();
        let req = get_parsed_request(&param).unwrap();
        assert!(req.req_bytes.is_empty());
        assert_eq!(req.op_nonce, U256::one());
    }
}
