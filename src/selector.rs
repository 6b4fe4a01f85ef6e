// src/selector.rs
use std::fmt;
use std::str::FromStr;

use ethers::utils::id;

use crate::error::HcError;

pub const EXECUTE: &str = "execute(address,uint256,bytes)";
pub const PUT_RESPONSE: &str = "PutResponse(bytes32,bytes)";
pub const GET_NONCE: &str = "getNonce(address,uint192)";
pub const OWNER: &str = "owner()";
pub const CREATE_ACCOUNT: &str = "createAccount(address,uint256)";
pub const GET_ADDRESS: &str = "getAddress(address,uint256)";

/// First four bytes of the keccak hash of a canonical function signature.
///
/// Call sites disagree on whether a selector is written with a `0x` prefix,
/// so the bytes are the canonical form and strings only appear through
/// [`Selector::with_prefix`] and [`Selector::bare`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Selector([u8; 4]);

impl Selector {
    /// `signature` must be canonical: no parameter names, no whitespace.
    pub fn from_signature(signature: &str) -> Self {
        Self(id(signature))
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// `0x` followed by 8 hex characters.
    pub fn with_prefix(&self) -> String {
        format!("0x{}", self.bare())
    }

    /// 8 hex characters, no prefix.
    pub fn bare(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; 4]> for Selector {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.with_prefix())
    }
}

impl FromStr for Selector {
    type Err = HcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 8 {
            return Err(HcError::Decode(format!(
                "selector must be 8 hex characters, got {s:?}"
            )));
        }
        let mut bytes = [0u8; 4];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| HcError::Decode(format!("selector {s:?}: {e}")))?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_selectors() {
        assert_eq!(
            Selector::from_signature("transfer(address,uint256)").bare(),
            "a9059cbb"
        );
        assert_eq!(Selector::from_signature(EXECUTE).bare(), "b61d27f6");
        assert_eq!(Selector::from_signature(PUT_RESPONSE).bare(), "dfc98ae8");
        assert_eq!(Selector::from_signature(GET_NONCE).bare(), "35567e1a");
        assert_eq!(Selector::from_signature(OWNER).bare(), "8da5cb5b");
        assert_eq!(Selector::from_signature(CREATE_ACCOUNT).bare(), "5fbfb9cf");
        assert_eq!(Selector::from_signature(GET_ADDRESS).bare(), "8cb84e18");
    }

    #[test]
    fn deterministic() {
        let a = Selector::from_signature("addsub2(uint32,uint32)");
        let b = Selector::from_signature("addsub2(uint32,uint32)");
        assert_eq!(a, b);
        assert_ne!(a, Selector::from_signature("addsub2(uint32,uint64)"));
    }

    #[test]
    fn formatting() {
        let sel = Selector::from_signature(EXECUTE);
        assert_eq!(sel.with_prefix(), "0xb61d27f6");
        assert_eq!(sel.with_prefix().len(), 10);
        assert_eq!(sel.bare().len(), 8);
        assert_eq!(sel.to_string(), "0xb61d27f6");
        assert_eq!(sel.as_bytes(), &[0xb6, 0x1d, 0x27, 0xf6]);
    }

    #[test]
    fn parse_both_forms() {
        let sel = Selector::from_signature(PUT_RESPONSE);
        assert_eq!("dfc98ae8".parse::<Selector>().unwrap(), sel);
        assert_eq!("0xdfc98ae8".parse::<Selector>().unwrap(), sel);
        assert!("0xdfc98a".parse::<Selector>().is_err());
        assert!("zzzzzzzz".parse::<Selector>().is_err());
    }
}
