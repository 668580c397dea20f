// rime-cli: desktop command-line front end for Rime
//
// Manages login material and inspects balances and epochs offline.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use rime_core::epoch::{epoch_of, seconds_until_next_epoch};
use rime_core::store::SledStorage;
use rime_core::{Ciphertext, SessionStore};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "rime")]
#[command(about = "Rime: private withdrawals from encrypted balances", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive and store the account secret from a wallet signature
    Login {
        #[arg(short, long)]
        address: String,
        /// Hex-encoded signature over the login message
        #[arg(short, long)]
        signature: String,
    },
    /// Forget the account secret
    Logout {
        #[arg(short, long)]
        address: String,
    },
    /// Show the account's public key
    Whoami {
        #[arg(short, long)]
        address: String,
    },
    /// List logged-in addresses
    Accounts,
    /// Decrypt a 64-byte balance ciphertext
    Decrypt {
        #[arg(short, long)]
        address: String,
        #[arg(short, long)]
        ciphertext: String,
        /// Search bound; defaults to the configured one
        #[arg(short, long)]
        bound: Option<u64>,
    },
    /// Show the epoch for a timestamp (defaults to now)
    Epoch {
        #[arg(short, long)]
        timestamp: Option<u64>,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    /// Replace the relay failover list
    SetRelays { relays: Vec<String> },
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Login { address, signature } => cmd_login(address, signature),
        Commands::Logout { address } => cmd_logout(address),
        Commands::Whoami { address } => cmd_whoami(address),
        Commands::Accounts => cmd_accounts(),
        Commands::Decrypt {
            address,
            ciphertext,
            bound,
        } => cmd_decrypt(address, ciphertext, bound).await,
        Commands::Epoch { timestamp } => cmd_epoch(timestamp),
        Commands::Config { action } => cmd_config(action),
    }
}

fn open_store(config: &config::Config) -> Result<SessionStore> {
    let path = config.storage_path()?;
    let path = path.to_str().context("Storage path is not valid UTF-8")?;
    tracing::debug!("Opening session store at {}", path);
    let backend = SledStorage::new(path)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to open session store")?;
    Ok(SessionStore::new(Arc::new(backend)))
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x")).context("Invalid hex string")
}

fn cmd_login(address: String, signature: String) -> Result<()> {
    let config = config::Config::load()?;
    let store = open_store(&config)?;
    let signature = decode_hex(&signature)?;

    if store.login(&address, &signature)? {
        println!("  {} Logged in {}", "✓".green(), address.bright_cyan());
    } else {
        println!("  {} {} is already logged in", "•".yellow(), address.bright_cyan());
    }
    Ok(())
}

fn cmd_logout(address: String) -> Result<()> {
    let config = config::Config::load()?;
    let store = open_store(&config)?;

    if store.logout(&address)? {
        println!("  {} Logged out {}", "✓".green(), address.bright_cyan());
    } else {
        println!("  {} {} was not logged in", "•".yellow(), address.bright_cyan());
    }
    Ok(())
}

fn cmd_whoami(address: String) -> Result<()> {
    let config = config::Config::load()?;
    let store = open_store(&config)?;
    let keys = store
        .load(&address)?
        .with_context(|| format!("{} has not logged in", address))?;

    println!("{}", "Account".bold());
    println!("  Address:    {}", address.bright_cyan());
    println!("  Public Key: {}", keys.public().to_hex().bright_yellow());
    Ok(())
}

fn cmd_accounts() -> Result<()> {
    let config = config::Config::load()?;
    let store = open_store(&config)?;
    let addresses = store.addresses()?;

    if addresses.is_empty() {
        println!("No accounts logged in.");
        return Ok(());
    }
    println!("{}", "Logged-in accounts".bold());
    for address in addresses {
        println!("  {}", address.bright_cyan());
    }
    Ok(())
}

async fn cmd_decrypt(address: String, ciphertext: String, bound: Option<u64>) -> Result<()> {
    let config = config::Config::load()?;
    let store = open_store(&config)?;
    let keys = store
        .load(&address)?
        .with_context(|| format!("{} has not logged in", address))?;
    let ciphertext = Ciphertext::from_bytes(&decode_hex(&ciphertext)?)
        .context("Ciphertext must be two compressed points")?;
    let bound = bound.unwrap_or(config.client.decrypt_bound);

    // The search is CPU bound and may take a while for large balances.
    let amount = tokio::task::spawn_blocking(move || keys.secret().decrypt(&ciphertext, bound))
        .await
        .context("Decryption task failed")??;

    println!(
        "  {} Balance: {} ETH ({} milli-ETH)",
        "✓".green(),
        rime_core::fees::format_eth(amount).bright_yellow(),
        amount
    );
    Ok(())
}

fn cmd_epoch(timestamp: Option<u64>) -> Result<()> {
    let config = config::Config::load()?;
    let timestamp = match timestamp {
        Some(timestamp) => timestamp,
        None => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("System clock is before 1970")?
            .as_secs(),
    };
    let length = config.client.epoch_length;

    println!("{}", "Epoch".bold());
    println!("  Timestamp:      {}", timestamp);
    println!("  Epoch:          {}", epoch_of(timestamp, length).to_string().bright_cyan());
    println!(
        "  Next boundary:  {}s",
        seconds_until_next_epoch(timestamp, length)
    );
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = config::Config::load()?;
            println!("{}", "Configuration".bold());
            for (key, value) in config.list() {
                println!("  {:<22} {}", key, value);
            }
            println!();
            println!("File: {}", config::Config::config_file()?.display());
        }
        ConfigAction::SetRelays { relays } => {
            let mut config = config::Config::load()?;
            config.set_relays(relays);
            config.save()?;
            println!(
                "  {} Relays: {}",
                "✓".green(),
                config.client.relays.join(", ").bright_cyan()
            );
        }
        ConfigAction::Reset => {
            config::Config::default().save()?;
            println!("  {} Configuration reset to defaults", "✓".green());
        }
    }
    Ok(())
}
