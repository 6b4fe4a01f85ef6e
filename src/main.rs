// src/main.rs
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ethers::types::{Address, U256};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use hc_offchain::abi::checksum;
use hc_offchain::config::{self, ResponderConfig, UserOpManagerConfig};
use hc_offchain::handlers::{AddSub2, ADDSUB2};
use hc_offchain::response::ResponseGenerator;
use hc_offchain::rpc::{start_server, OffchainRpc};
use hc_offchain::types::{AccountType, CreateSmartAccountParams, GetExpectedAddressParams};
use hc_offchain::userop::UserOpManager;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(long, default_value = "info")]
    log_level: Level,

    #[clap(long, env = "OC_LISTEN_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    #[clap(short, long, env = "OC_LISTEN_PORT", default_value_t = 1234)]
    port: u16,

    #[clap(flatten)]
    config: ConfigArgs,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the offchain JSON-RPC server (default)
    Serve,
    /// Print the counterfactual address of the signer's account for a salt
    ExpectedAddress {
        #[clap(long, value_parser = parse_u256)]
        salt: U256,
        #[clap(long)]
        hybrid: bool,
    },
    /// Deploy and fund a smart account
    CreateAccount {
        #[clap(long, value_parser = parse_u256)]
        salt: U256,
        /// Defaults to the signer
        #[clap(long)]
        owner: Option<Address>,
        #[clap(long)]
        hybrid: bool,
    },
}

#[derive(clap::Args)]
#[clap(next_help_heading = "Configuration")]
struct ConfigArgs {
    #[clap(long, env = "HC_HELPER_ADDR")]
    helper_addr: Option<String>,

    #[clap(long, env = "OC_HYBRID_ACCOUNT")]
    hybrid_account: Option<String>,

    #[clap(long, env = "CHAIN_ID")]
    chain_id: Option<String>,

    #[clap(long, env = "OC_PRIVKEY", hide_env_values = true)]
    responder_key: Option<String>,

    #[clap(long, env = "ENTRY_POINTS")]
    entry_point: Option<String>,

    #[clap(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    #[clap(long, env = "BUNDLER_RPC")]
    bundler_rpc: Option<String>,

    #[clap(long, env = "CLIENT_PRIVATE_KEY", hide_env_values = true)]
    client_key: Option<String>,

    #[clap(long, env = "SIMPLE_ACCOUNT_FACTORY")]
    simple_account_factory: Option<String>,

    #[clap(long, env = "HYBRID_ACCOUNT_FACTORY")]
    hybrid_account_factory: Option<String>,
}

impl ConfigArgs {
    fn lookup(&self, name: &str) -> Option<String> {
        let value = match name {
            config::HC_HELPER_ADDR => &self.helper_addr,
            config::OC_HYBRID_ACCOUNT => &self.hybrid_account,
            config::CHAIN_ID => &self.chain_id,
            config::OC_PRIVKEY => &self.responder_key,
            config::ENTRY_POINTS => &self.entry_point,
            config::RPC_URL => &self.rpc_url,
            config::BUNDLER_RPC => &self.bundler_rpc,
            config::CLIENT_PRIVATE_KEY => &self.client_key,
            config::SIMPLE_ACCOUNT_FACTORY => &self.simple_account_factory,
            config::HYBRID_ACCOUNT_FACTORY => &self.hybrid_account_factory,
            _ => return None,
        };
        value.clone()
    }
}

fn parse_u256(value: &str) -> Result<U256, String> {
    match value.strip_prefix("0x") {
        Some(digits) => U256::from_str_radix(digits, 16).map_err(|e| e.to_string()),
        None => U256::from_dec_str(value).map_err(|e| e.to_string()),
    }
}

fn account_type(hybrid: bool) -> AccountType {
    if hybrid {
        AccountType::Hybrid
    } else {
        AccountType::Simple
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&args.config, SocketAddr::new(args.host, args.port)).await,
        Command::ExpectedAddress { salt, hybrid } => {
            let manager = user_op_manager(&args.config)?;
            let address = manager
                .get_expected_address(GetExpectedAddressParams {
                    salt,
                    account_type: account_type(hybrid),
                })
                .await?;
            println!("{}", checksum(&address));
            Ok(())
        }
        Command::CreateAccount {
            salt,
            owner,
            hybrid,
        } => {
            let manager = user_op_manager(&args.config)?;
            let created = manager
                .create_smart_account(CreateSmartAccountParams {
                    salt,
                    owner,
                    account_type: account_type(hybrid),
                })
                .await?;
            if let Some(receipt) = &created.receipt {
                info!("Account created in {:?}", receipt.transaction_hash);
            }
            println!("{}", checksum(&created.address));
            Ok(())
        }
    }
}

fn user_op_manager(args: &ConfigArgs) -> anyhow::Result<UserOpManager> {
    let config = UserOpManagerConfig::from_lookup(|name| args.lookup(name))?;
    Ok(UserOpManager::new(config)?)
}

async fn serve(args: &ConfigArgs, server_addr: SocketAddr) -> anyhow::Result<()> {
    let responder = ResponderConfig::from_lookup(|name| args.lookup(name))?;

    let mut rpc = OffchainRpc::new(ResponseGenerator::new(responder));
    rpc.add_server_action(ADDSUB2, Arc::new(AddSub2));

    info!("Starting hybrid compute offchain server on {}", server_addr);
    let (_, server_handle) = start_server(server_addr, rpc).await?;

    // Keep the server running until Ctrl+C is pressed
    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}
