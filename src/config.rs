// src/config.rs
use std::fmt;
use std::time::Duration;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H160, U256};
use ethers::utils::parse_ether;

use crate::error::HcError;

pub const HC_HELPER_ADDR: &str = "HC_HELPER_ADDR";
pub const OC_HYBRID_ACCOUNT: &str = "OC_HYBRID_ACCOUNT";
pub const CHAIN_ID: &str = "CHAIN_ID";
pub const OC_PRIVKEY: &str = "OC_PRIVKEY";
pub const ENTRY_POINTS: &str = "ENTRY_POINTS";
pub const RPC_URL: &str = "RPC_URL";
pub const BUNDLER_RPC: &str = "BUNDLER_RPC";
pub const CLIENT_PRIVATE_KEY: &str = "CLIENT_PRIVATE_KEY";
pub const SIMPLE_ACCOUNT_FACTORY: &str = "SIMPLE_ACCOUNT_FACTORY";
pub const HYBRID_ACCOUNT_FACTORY: &str = "HYBRID_ACCOUNT_FACTORY";

/// EntryPoint v0.7, same address on every supported chain.
pub const ENTRY_POINT_V07: Address = H160([
    0x00, 0x00, 0x00, 0x00, 0x71, 0x72, 0x7d, 0xe2, 0x2e, 0x5e, 0x9d, 0x8b, 0xaf, 0x0e, 0xda, 0xc6,
    0xf3, 0x7d, 0xa0, 0x32,
]);

const SEPOLIA_SIMPLE_ACCOUNT_FACTORY: Address = H160([
    0x9a, 0xc9, 0x04, 0xd8, 0xdf, 0xea, 0x08, 0x66, 0xab, 0x34, 0x12, 0x08, 0x70, 0x0d, 0xca, 0x92,
    0x07, 0x83, 0x4d, 0xeb,
]);
const MAINNET_SIMPLE_ACCOUNT_FACTORY: Address = H160([
    0x58, 0x49, 0x60, 0xa8, 0x50, 0xd7, 0x44, 0x00, 0x28, 0x0c, 0x43, 0x6a, 0x07, 0xbe, 0x73, 0x8c,
    0x1c, 0x96, 0x19, 0x5b,
]);
const HYBRID_ACCOUNT_FACTORY_ADDR: Address = H160([
    0xfe, 0x90, 0xbc, 0xd7, 0xe5, 0xe3, 0xf8, 0x83, 0x83, 0xa2, 0x16, 0xb0, 0x50, 0xce, 0x4e, 0x51,
    0x3a, 0x81, 0x78, 0xae,
]);

/// Networks with known factory deployments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
    BobaSepolia,
    BobaMainnet,
}

impl Network {
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            28882 => Some(Network::BobaSepolia),
            288 => Some(Network::BobaMainnet),
            _ => None,
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::BobaSepolia => 28882,
            Network::BobaMainnet => 288,
        }
    }

    pub fn simple_account_factory(&self) -> Address {
        match self {
            Network::BobaSepolia => SEPOLIA_SIMPLE_ACCOUNT_FACTORY,
            Network::BobaMainnet => MAINNET_SIMPLE_ACCOUNT_FACTORY,
        }
    }

    pub fn hybrid_account_factory(&self) -> Address {
        HYBRID_ACCOUNT_FACTORY_ADDR
    }
}

/// Settings the response generator signs with. Built once at startup and
/// never mutated.
#[derive(Clone)]
pub struct ResponderConfig {
    /// HCHelper contract which receives `PutResponse`
    pub helper_addr: Address,
    /// HybridAccount that executes the response operation
    pub hybrid_account: Address,
    pub chain_id: u64,
    pub entry_point: Address,
    signer: LocalWallet,
}

impl ResponderConfig {
    pub fn new(
        helper_addr: Address,
        hybrid_account: Address,
        chain_id: u64,
        private_key: &str,
        entry_point: Address,
    ) -> Result<Self, HcError> {
        Ok(Self {
            helper_addr,
            hybrid_account,
            chain_id,
            entry_point,
            signer: parse_wallet(OC_PRIVKEY, private_key)?,
        })
    }

    pub fn from_env() -> Result<Self, HcError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// All five values are looked up before any is parsed, so a missing one
    /// is always reported as missing rather than as a parse failure.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HcError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let helper_addr = required(&lookup, HC_HELPER_ADDR)?;
        let hybrid_account = required(&lookup, OC_HYBRID_ACCOUNT)?;
        let chain_id = required(&lookup, CHAIN_ID)?;
        let private_key = required(&lookup, OC_PRIVKEY)?;
        let entry_point = required(&lookup, ENTRY_POINTS)?;

        Self::new(
            parse_address(HC_HELPER_ADDR, &helper_addr)?,
            parse_address(OC_HYBRID_ACCOUNT, &hybrid_account)?,
            parse_chain_id(&chain_id)?,
            &private_key,
            parse_address(ENTRY_POINTS, &entry_point)?,
        )
    }

    pub fn signer(&self) -> &LocalWallet {
        &self.signer
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }
}

impl fmt::Debug for ResponderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponderConfig")
            .field("helper_addr", &self.helper_addr)
            .field("hybrid_account", &self.hybrid_account)
            .field("chain_id", &self.chain_id)
            .field("entry_point", &self.entry_point)
            .field("signer", &self.signer.address())
            .finish()
    }
}

/// Receipt polling schedule for submitted operations.
#[derive(Clone, Copy, Debug)]
pub struct ReceiptPolling {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 50,
        }
    }
}

#[derive(Clone)]
pub struct UserOpManagerConfig {
    pub node_url: String,
    pub bundler_url: String,
    pub entry_point: Address,
    pub chain_id: u64,
    signer: LocalWallet,
    /// Overrides the network default
    pub simple_account_factory: Option<Address>,
    /// Overrides the network default
    pub hybrid_account_factory: Option<Address>,
    pub receipt_polling: ReceiptPolling,
    /// Node polling interval while waiting for plain transactions to confirm.
    /// `None` keeps the provider default.
    pub confirmation_interval: Option<Duration>,
    /// Value sent to a freshly created smart account
    pub funding_amount: U256,
}

impl UserOpManagerConfig {
    pub fn new(
        node_url: impl Into<String>,
        bundler_url: impl Into<String>,
        entry_point: Address,
        chain_id: u64,
        private_key: &str,
    ) -> Result<Self, HcError> {
        let signer = parse_wallet(CLIENT_PRIVATE_KEY, private_key)?.with_chain_id(chain_id);
        let funding_amount =
            parse_ether("0.001").map_err(|e| HcError::invalid_config("funding_amount", e))?;
        Ok(Self {
            node_url: node_url.into(),
            bundler_url: bundler_url.into(),
            entry_point,
            chain_id,
            signer,
            simple_account_factory: None,
            hybrid_account_factory: None,
            receipt_polling: ReceiptPolling::default(),
            confirmation_interval: None,
            funding_amount,
        })
    }

    pub fn from_env() -> Result<Self, HcError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, HcError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let node_url = required(&lookup, RPC_URL)?;
        let bundler_url = required(&lookup, BUNDLER_RPC)?;
        let entry_point = required(&lookup, ENTRY_POINTS)?;
        let chain_id = required(&lookup, CHAIN_ID)?;
        let private_key = required(&lookup, CLIENT_PRIVATE_KEY)?;

        let mut config = Self::new(
            node_url,
            bundler_url,
            parse_address(ENTRY_POINTS, &entry_point)?,
            parse_chain_id(&chain_id)?,
            &private_key,
        )?;
        config.simple_account_factory = optional(&lookup, SIMPLE_ACCOUNT_FACTORY)
            .map(|v| parse_address(SIMPLE_ACCOUNT_FACTORY, &v))
            .transpose()?;
        config.hybrid_account_factory = optional(&lookup, HYBRID_ACCOUNT_FACTORY)
            .map(|v| parse_address(HYBRID_ACCOUNT_FACTORY, &v))
            .transpose()?;
        Ok(config)
    }

    pub fn with_simple_account_factory(mut self, factory: Address) -> Self {
        self.simple_account_factory = Some(factory);
        self
    }

    pub fn with_hybrid_account_factory(mut self, factory: Address) -> Self {
        self.hybrid_account_factory = Some(factory);
        self
    }

    pub fn with_receipt_polling(mut self, polling: ReceiptPolling) -> Self {
        self.receipt_polling = polling;
        self
    }

    pub fn with_confirmation_interval(mut self, interval: Duration) -> Self {
        self.confirmation_interval = Some(interval);
        self
    }

    pub fn signer(&self) -> &LocalWallet {
        &self.signer
    }

    pub fn network(&self) -> Option<Network> {
        Network::from_chain_id(self.chain_id)
    }
}

impl fmt::Debug for UserOpManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserOpManagerConfig")
            .field("node_url", &self.node_url)
            .field("bundler_url", &self.bundler_url)
            .field("entry_point", &self.entry_point)
            .field("chain_id", &self.chain_id)
            .field("signer", &self.signer.address())
            .field("simple_account_factory", &self.simple_account_factory)
            .field("hybrid_account_factory", &self.hybrid_account_factory)
            .field("receipt_polling", &self.receipt_polling)
            .field("confirmation_interval", &self.confirmation_interval)
            .field("funding_amount", &self.funding_amount)
            .finish()
    }
}

fn optional<F>(lookup: &F, var: &'static str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var).filter(|v| !v.trim().is_empty())
}

fn required<F>(lookup: &F, var: &'static str) -> Result<String, HcError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, var).ok_or(HcError::MissingConfig(var))
}

fn parse_address(var: &'static str, value: &str) -> Result<Address, HcError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|e| HcError::invalid_config(var, e))
}

fn parse_chain_id(value: &str) -> Result<u64, HcError> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x") {
        Some(digits) => u64::from_str_radix(digits, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|e| HcError::invalid_config(CHAIN_ID, e))
}

// The key itself never appears in the error.
fn parse_wallet(var: &'static str, private_key: &str) -> Result<LocalWallet, HcError> {
    private_key
        .trim()
        .parse::<LocalWallet>()
        .map_err(|_| HcError::invalid_config(var, "not a valid secp256k1 private key"))
}
