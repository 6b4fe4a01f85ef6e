// src/lib.rs
//! Offchain side of hybrid compute: decodes requests emitted by contracts,
//! runs registered actions and signs responses the EntryPoint accepts, and
//! builds user operations for smart accounts.

pub mod abi;
pub mod config;
pub mod error;
pub mod handlers;
pub mod packing;
pub mod request;
pub mod response;
pub mod rpc;
pub mod selector;
pub mod types;
pub mod userop;

pub use error::HcError;
