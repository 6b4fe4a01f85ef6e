// src/rpc.rs
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::Bytes;
use jsonrpsee::core::RpcResult;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::types::error::{ErrorObject, ErrorObjectOwned, INVALID_PARAMS_CODE};
use jsonrpsee::RpcModule;
use tracing::{debug, error, info};

use crate::error::HcError;
use crate::request::{get_parsed_request, OffchainParameter, ParsedRequest};
use crate::response::ResponseGenerator;
use crate::selector::Selector;
use crate::types::ServerActionResponse;

/// What an action wants signed: an error code (0 is success) and the
/// response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutput {
    pub error_code: u32,
    pub payload: Bytes,
}

impl ActionOutput {
    pub fn ok(payload: impl Into<Bytes>) -> Self {
        Self {
            error_code: 0,
            payload: payload.into(),
        }
    }

    pub fn error(error_code: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            error_code,
            payload: payload.into(),
        }
    }
}

/// Business logic behind one offchain function signature.
#[async_trait]
pub trait ServerAction: Send + Sync {
    async fn call(&self, req: &ParsedRequest) -> Result<ActionOutput, HcError>;
}

struct RegisteredAction {
    signature: String,
    action: Arc<dyn ServerAction>,
}

/// Offchain actions keyed by selector, plus the generator that signs their
/// results.
pub struct OffchainRpc {
    generator: ResponseGenerator,
    actions: HashMap<Selector, RegisteredAction>,
}

impl OffchainRpc {
    pub fn new(generator: ResponseGenerator) -> Self {
        Self {
            generator,
            actions: HashMap::new(),
        }
    }

    /// Registers `action` under the selector of `signature`, replacing any
    /// action previously registered there.
    pub fn add_server_action(
        &mut self,
        signature: &str,
        action: Arc<dyn ServerAction>,
    ) -> Selector {
        let selector = Selector::from_signature(signature);
        info!("Registered {} as {}", signature, selector);
        self.actions.insert(
            selector,
            RegisteredAction {
                signature: signature.to_string(),
                action,
            },
        );
        selector
    }

    pub fn selectors(&self) -> impl Iterator<Item = &Selector> {
        self.actions.keys()
    }

    pub async fn dispatch(
        &self,
        selector: Selector,
        param: OffchainParameter,
    ) -> Result<ServerActionResponse, HcError> {
        let registered = self
            .actions
            .get(&selector)
            .ok_or_else(|| HcError::Decode(format!("no action registered for {selector}")))?;
        debug!(
            "Received {} request from {} (nonce {})",
            registered.signature, param.src_addr, param.src_nonce
        );

        let req = get_parsed_request(&param)?;
        let output = registered.action.call(&req).await?;
        let response = self
            .generator
            .generate_response(&req, output.error_code, &output.payload)?;

        info!(
            "Answered {} for {} with error code {}",
            registered.signature,
            req.src_addr_checksum(),
            output.error_code
        );
        Ok(response)
    }
}

fn to_rpc_error(err: HcError) -> ErrorObjectOwned {
    let code = match err {
        HcError::Decode(_) | HcError::Abi(_) => INVALID_PARAMS_CODE,
        _ => -32000,
    };
    ErrorObject::owned(code, format!("Offchain error: {err}"), None::<()>)
}

/// Builds the module with every registered action reachable under both its
/// bare and `0x`-prefixed selector.
pub fn into_module(rpc: OffchainRpc) -> anyhow::Result<RpcModule<OffchainRpc>> {
    let selectors: Vec<Selector> = rpc.selectors().copied().collect();
    let mut module = RpcModule::new(rpc);

    for selector in selectors {
        for name in [selector.bare(), selector.with_prefix()] {
            // Method names must be 'static; this runs once per action at startup.
            let name: &'static str = Box::leak(name.into_boxed_str());
            module.register_async_method(name, move |params, context| async move {
                let param = params
                    .parse::<OffchainParameter>()
                    .or_else(|_| params.one::<OffchainParameter>())?;
                let result: RpcResult<ServerActionResponse> =
                    context.dispatch(selector, param).await.map_err(|e| {
                        error!("Failed to handle {}: {}", selector, e);
                        to_rpc_error(e)
                    });
                result
            })?;
        }
    }
    Ok(module)
}

pub async fn start_server(
    server_addr: SocketAddr,
    rpc: OffchainRpc,
) -> anyhow::Result<(SocketAddr, ServerHandle)> {
    let server = ServerBuilder::default().build(server_addr).await?;
    let local_addr = server.local_addr()?;

    let module = into_module(rpc)?;
    let server_handle = server.start(module);
    info!("Offchain RPC server listening on {}", local_addr);

    Ok((local_addr, server_handle))
}
