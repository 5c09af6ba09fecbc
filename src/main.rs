//! # Elements Covenant CLI
//!
//! Command line front end for the output-script covenant.
//!
//! ## Usage
//!
//! ```bash
//! # Covenant address for the configured keys
//! covenant address --network regtest
//!
//! # Covenant and destination scripts for a custom suffix
//! covenant script --suffix "OP_CHECKSIG"
//!
//! # Fresh key material for .env
//! covenant keygen
//!
//! # Issue, lock, fund and spend against a regtest node
//! covenant demo --timeout 60
//! ```
//!
//! Keys and node settings come from the environment or `.env`; see
//! [`elements_covenant::config::env`].

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use elements_covenant::config::{env as config_env, network as net_config};
use elements_covenant::identity::generate_secret_key;
use elements_covenant::script::{Script, ScriptExt};
use elements_covenant::services::{Deadline, LedgerNode};
use elements_covenant::{
    CovenantFlow, DestinationScript, ElementsRpcClient, NetworkParams, SigningIdentity,
    TaprootCommitment,
};
use log::info;
use std::{env, time::Duration};

#[derive(Parser)]
#[command(name = "covenant")]
#[command(about = "Elements Taproot covenant that forces a spend to pay a committed output script")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the covenant address and output script
    Address {
        /// Script the destination must end with
        #[arg(short, long, default_value = "OP_CHECKSIG")]
        suffix: String,
        /// Network name (regtest, liquidtestnet, liquid)
        #[arg(short, long)]
        network: Option<String>,
    },
    /// Print the covenant and destination scripts
    Script {
        /// Script the destination must end with
        #[arg(short, long, default_value = "OP_CHECKSIG")]
        suffix: String,
    },
    /// Generate fresh funding and internal keys
    Keygen {
        /// Network name used for the funding address
        #[arg(short, long)]
        network: Option<String>,
    },
    /// Run the full covenant flow against the configured node
    Demo {
        /// Deadline for the whole flow in seconds
        #[arg(short, long, default_value_t = net_config::DEFAULT_FLOW_DEADLINE.as_secs())]
        timeout: u64,
        /// Network name (regtest, liquidtestnet, liquid)
        #[arg(short, long)]
        network: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Address { suffix, network } => {
            address(&suffix, network)?;
        }
        Commands::Script { suffix } => {
            script(&suffix)?;
        }
        Commands::Keygen { network } => {
            keygen(network)?;
        }
        Commands::Demo { timeout, network } => {
            demo(Duration::from_secs(timeout), network).await?;
        }
    }

    Ok(())
}

fn resolve_network(name: Option<String>) -> Result<NetworkParams> {
    dotenv::dotenv().ok();
    let name = name
        .or_else(|| env::var(config_env::NETWORK).ok())
        .unwrap_or_else(|| net_config::DEFAULT_NETWORK.to_string());
    NetworkParams::from_name(&name).with_context(|| format!("resolving network {name}"))
}

/// Identity's internal key followed by `suffix`
fn destination_for(identity: &SigningIdentity, suffix_asm: &str) -> Result<DestinationScript> {
    let start = DestinationScript::default_for(identity).start().clone();
    let end = Script::from_asm(suffix_asm).context("parsing destination suffix")?;
    Ok(DestinationScript::new(start, end))
}

fn address(suffix: &str, network: Option<String>) -> Result<()> {
    let network = resolve_network(network)?;
    let identity = SigningIdentity::from_env()?;
    let destination = destination_for(&identity, suffix)?;

    let covenant =
        TaprootCommitment::for_script(identity.internal_x_only(), &destination.covenant())?;
    let target = TaprootCommitment::for_script(identity.internal_x_only(), &destination.full())?;

    println!("Network:             {}", network.name);
    println!("Internal key:        {}", identity.internal_x_only());
    println!("Covenant address:    {}", covenant.address(&network)?);
    println!("Covenant script:     {}", hex::encode(covenant.output_script().as_bytes()));
    println!("Destination address: {}", target.address(&network)?);
    println!("Destination script:  {}", hex::encode(target.output_script().as_bytes()));
    println!("Funding address:     {}", identity.funding_address(&network)?);
    Ok(())
}

fn script(suffix: &str) -> Result<()> {
    let identity = SigningIdentity::from_env()?;
    let destination = destination_for(&identity, suffix)?;
    let covenant = destination.covenant();

    println!("📜 Covenant leaf ({} bytes):", covenant.len());
    println!("  ASM: {}", destination.covenant_asm());
    println!("  Hex: {}", covenant.to_hex());
    println!();
    println!("🎯 Destination script:");
    println!("  ASM: {}", destination.destination_asm());
    println!("  Hex: {}", destination.full().to_hex());
    println!("  Enforced suffix: {}", destination.end().to_asm());
    Ok(())
}

fn keygen(network: Option<String>) -> Result<()> {
    let network = resolve_network(network)?;
    let funding = generate_secret_key();
    let internal = generate_secret_key();
    let identity = SigningIdentity::from_secret_keys(funding, &internal);

    println!("🔑 Fresh key material");
    println!("{}={}", config_env::FUNDING_KEY, funding.display_secret());
    println!("{}={}", config_env::INTERNAL_KEY, internal.display_secret());
    println!();
    println!("Funding public key:  {}", identity.funding_public_key());
    println!("Funding address:     {}", identity.funding_address(&network)?);
    println!("Internal public key: {}", identity.internal_public_key());
    Ok(())
}

async fn demo(deadline: Duration, network: Option<String>) -> Result<()> {
    let network = resolve_network(network)?;
    let identity = SigningIdentity::from_env()?;
    let client = ElementsRpcClient::from_env()?;
    info!("Using node at {} on {}", client.url(), network.name);

    let flow = CovenantFlow::new(client, identity, network);
    let flow_deadline = Deadline::after(deadline);
    let task = tokio::task::spawn_blocking(move || {
        flow_deadline.check("getbalance")?;
        let balance = flow.node().get_balance()?;
        info!("Wallet balance: {:?}", balance);
        flow.run(flow_deadline)
    });

    // the flow stops itself at the deadline; this only bounds a node call stuck in flight
    let report = tokio::time::timeout(deadline + net_config::DEADLINE_GRACE, task)
        .await
        .map_err(|_| anyhow!("covenant flow timed out after {}s", deadline.as_secs()))?
        .context("covenant flow task failed")??;

    println!("✅ Covenant spend complete");
    println!("  Asset:               {}", report.asset);
    println!("  Covenant address:    {}", report.covenant_address);
    println!("  Destination address: {}", report.destination_address);
    println!("  Lock txid:           {}", report.lock_txid);
    println!("  Funding txid:        {}", report.funding_txid);
    println!("  Spend txid:          {}", report.spend_txid);
    println!("  Raw transaction:     {}", report.raw_hex);
    Ok(())
}
