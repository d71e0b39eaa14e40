// src/main.rs
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ethers::types::H256;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use bitlayer_aa::paymaster::PaymasterActions;
use bitlayer_aa::transport::http_bundler_paymaster_transport;
use bitlayer_aa::types::Chain;
use bitlayer_aa::{ConfigArgs, RetryPolicy, SmartAccountClient, SmartAccountConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Inspect ERC-4337 user operations through a Bitlayer bundler and paymaster", long_about = None)]
struct Args {
    #[clap(flatten)]
    config: ConfigArgs,

    /// Node endpoint for every method the bundler and paymaster do not serve
    #[clap(long, env = "CHAIN_RPC_URL", default_value = "https://testnet-rpc.bitlayer.org")]
    rpc_url: String,

    #[clap(long, env = "CHAIN_ID", default_value_t = 200810)]
    chain_id: u64,

    #[clap(long, env = "CHAIN_NAME", default_value = "Bitlayer Testnet")]
    chain_name: String,

    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List entry points served by the bundler and the paymaster
    EntryPoints,
    /// Fetch the receipt of a user operation
    Receipt { hash: H256 },
    /// Fetch a user operation by its hash
    UserOp { hash: H256 },
    /// Wait until a user operation is mined
    Wait {
        hash: H256,
        #[clap(long, default_value_t = 10)]
        max_retries: u32,
        #[clap(long, default_value_t = 5000)]
        interval_ms: u64,
        #[clap(long, default_value_t = 1.5)]
        multiplier: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = SmartAccountConfig::try_from(args.config)?;
    let chain = Chain {
        id: args.chain_id,
        name: args.chain_name,
        rpc_url: args.rpc_url,
        explorer_url: None,
    };

    let transport = http_bundler_paymaster_transport(
        &config.bundler_url,
        &config.paymaster_url,
        &chain.rpc_url,
    )?;
    let paymaster = PaymasterActions::new(config.api_key.clone(), config.paymaster_address);
    let client = SmartAccountClient::new(chain, Arc::new(transport), None, paymaster);

    info!("Using bundler {} and paymaster {}", config.bundler_url, config.paymaster_url);

    match args.command {
        Command::EntryPoints => {
            let bundler = client.supported_entry_points().await?;
            let paymaster = client.paymaster_entry_points().await?;
            println!("bundler:   {:?}", bundler);
            println!("paymaster: {:?}", paymaster);
        }
        Command::Receipt { hash } => match client.get_user_operation_receipt(hash).await? {
            Some(receipt) => println!("{:#?}", receipt),
            None => warn!("No receipt for {:?} yet", hash),
        },
        Command::UserOp { hash } => match client.get_user_operation_by_hash(hash).await? {
            Some(op) => println!("{:#?}", op),
            None => warn!("User operation {:?} not found", hash),
        },
        Command::Wait { hash, max_retries, interval_ms, multiplier } => {
            let policy = RetryPolicy::new(max_retries, interval_ms, multiplier);
            let tx_hash = client.wait_for_user_operation_transaction(hash, &policy).await?;
            println!("{:?}", tx_hash);
        }
    }

    Ok(())
}
