// src/handlers.rs
//! Example offchain actions.

use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::types::U256;
use tracing::{debug, warn};

use crate::error::HcError;
use crate::request::ParsedRequest;
use crate::rpc::{ActionOutput, ServerAction};

pub const ADDSUB2: &str = "addsub2(uint32,uint32)";

/// Sum and difference of two `uint32`. Answers error code 1 if the
/// difference would underflow or the payload is malformed.
pub struct AddSub2;

#[async_trait]
impl ServerAction for AddSub2 {
    async fn call(&self, req: &ParsedRequest) -> Result<ActionOutput, HcError> {
        let (a, b) = match req.decode_payload("uint32,uint32").map(|t| t.into_iter()) {
            Ok(mut tokens) => match (tokens.next(), tokens.next()) {
                (Some(Token::Uint(a)), Some(Token::Uint(b))) => (a, b),
                _ => return Ok(ActionOutput::error(1, b"unknown error".to_vec())),
            },
            Err(e) => {
                warn!("addsub2 payload did not decode: {}", e);
                return Ok(ActionOutput::error(1, b"unknown error".to_vec()));
            }
        };

        if a < b {
            debug!("addsub2 underflow: {} - {}", a, b);
            return Ok(ActionOutput::error(1, b"underflow error".to_vec()));
        }

        let sum: U256 = a + b;
        let diff: U256 = a - b;
        Ok(ActionOutput::ok(encode(&[Token::Uint(sum), Token::Uint(diff)])))
    }
}
