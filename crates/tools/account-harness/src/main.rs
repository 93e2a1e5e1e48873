//! CLI harness for the account layer
//!
//! This tool allows:
//! - Generating keys and deriving their view key and address
//! - Signing and verifying messages
//! - Timing each operation class

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use provable_account::{Account, Dispatcher, Material, NetworkType, SharedEngine};
use provable_engine::ReferenceEngine;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Parser)]
#[command(name = "account-harness")]
#[command(about = "Provable account layer harness", long_about = None)]
struct Cli {
    /// Network for text encodings (mainnet, testnet, regtest)
    #[arg(short, long, global = true, default_value = "mainnet")]
    network: NetworkType,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a private key with its view key and address
    Generate,

    /// Derive the view key and address of a private key
    Derive {
        /// Private key text
        private_key: String,
    },

    /// Sign a message, printing the signature as hex
    Sign {
        /// Private key text
        private_key: String,
        /// Message to sign
        message: String,
    },

    /// Verify a hex signature
    Verify {
        /// Address text
        address: String,
        /// Signature as hex
        signature: String,
        /// Message that was signed
        message: String,
    },

    /// Time each operation class
    Bench {
        /// Iterations per operation
        #[arg(short, long, default_value = "200")]
        iterations: u32,

        /// Message size in bytes
        #[arg(short, long, default_value = "256")]
        message_size: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("PROVABLE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let engine: SharedEngine = Arc::new(ReferenceEngine::new(cli.network));
    let account = Account::new(
        engine,
        Dispatcher::with_handle(tokio::runtime::Handle::current()),
    );

    match cli.command {
        Commands::Generate => run_generate(&account).await?,
        Commands::Derive { private_key } => run_derive(&account, &private_key).await?,
        Commands::Sign {
            private_key,
            message,
        } => run_sign(&account, &private_key, &message).await?,
        Commands::Verify {
            address,
            signature,
            message,
        } => run_verify(&account, &address, &signature, &message).await?,
        Commands::Bench {
            iterations,
            message_size,
        } => run_bench(&account, iterations, message_size).await?,
    }

    Ok(())
}

async fn run_generate(account: &Account) -> anyhow::Result<()> {
    let key = account.create_private_key().await?;
    println!("private key: {}", account.to_string(&key).await?);
    print_derived(account, &key).await
}

async fn run_derive(account: &Account, private_key: &str) -> anyhow::Result<()> {
    let key = account.private_key_from_string(private_key).await?;
    print_derived(account, &key).await
}

async fn print_derived(account: &Account, key: &provable_account::PrivateKey) -> anyhow::Result<()> {
    let view_key = account.private_key_to_view_key(key).await?;
    let address = account.private_key_to_address(key).await?;
    let via_view = account.view_key_to_address(&view_key).await?;

    let address_text = account.to_string(&address).await?;
    anyhow::ensure!(
        address_text == via_view.encode()?,
        "view key derived a different address"
    );

    println!("view key:    {}", account.to_string(&view_key).await?);
    println!("address:     {address_text}");
    Ok(())
}

async fn run_sign(account: &Account, private_key: &str, message: &str) -> anyhow::Result<()> {
    let key = account.private_key_from_string(private_key).await?;
    let signature = account.sign(&key, message).await?;
    println!("{}", hex::encode(signature));
    Ok(())
}

async fn run_verify(
    account: &Account,
    address: &str,
    signature: &str,
    message: &str,
) -> anyhow::Result<()> {
    let address = account.address_from_string(address).await?;
    let signature = hex::decode(signature).context("signature is not hex")?;
    let valid = account.verify(&address, &signature, message).await?;
    anyhow::ensure!(valid, "signature is invalid");
    println!("valid");
    Ok(())
}

async fn run_bench(account: &Account, iterations: u32, message_size: usize) -> anyhow::Result<()> {
    anyhow::ensure!(iterations > 0, "iterations must be positive");
    info!(iterations, message_size, "Starting benchmark");

    let message = vec![0x5Au8; message_size];
    let key = account.create_private_key().await?;
    let address = account.private_key_to_address(&key).await?;
    let key_text = account.to_string(&key).await?;
    let signature = account.sign(&key, &message).await?;

    let operations = ["generate", "parse", "derive", "to_string", "sign", "verify"];
    let pb = ProgressBar::new(u64::from(iterations) * operations.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut timings = Vec::with_capacity(operations.len());
    for name in operations {
        pb.set_message(name);
        let start = Instant::now();
        for _ in 0..iterations {
            match name {
                "generate" => drop(account.create_private_key().await?),
                "parse" => drop(account.private_key_from_string(&key_text).await?),
                "derive" => drop(account.private_key_to_address(&key).await?),
                "to_string" => drop(account.to_string(&address).await?),
                "sign" => drop(account.sign(&key, &message).await?),
                _ => anyhow::ensure!(account.verify(&address, &signature, &message).await?),
            }
            pb.inc(1);
        }
        timings.push((name, start.elapsed()));
    }
    pb.finish_with_message("done");

    info!("Benchmark Results:");
    for (name, elapsed) in timings {
        let per_op = elapsed / iterations;
        info!(
            "  {:<10} {:>10.1} us/op | {:>8.0} ops/s",
            name,
            micros(per_op),
            f64::from(iterations) / elapsed.as_secs_f64()
        );
    }
    Ok(())
}

fn micros(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000_000.0
}
