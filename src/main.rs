//! Pearl Ledger CLI
//!
//! Thin driver over the economy services. Every command prints its result as
//! pretty JSON on stdout; logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Create the storage directory, config file and database
//! pearl-ledger init
//!
//! # Open an account, optionally applying a referral code
//! pearl-ledger open-account alice --email alice@example.com --referral-code K3X9Q2ZA
//!
//! # Daily reward and its 7-day schedule
//! pearl-ledger claim-daily <account-id>
//! pearl-ledger daily-status <account-id>
//!
//! # Spend and send
//! pearl-ledger purchase <account-id> crown 450
//! pearl-ledger transfer <account-id> bob 100
//!
//! # Read the ledger
//! pearl-ledger history <account-id> --page 2 --cause purchase
//! pearl-ledger reconcile <account-id>
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use chrono::NaiveDate;
use pearl_ledger::db::PageRequest;
use pearl_ledger::services::{spawn_logging_listener, PurchaseKind};
use pearl_ledger::{Config, LedgerDb, LedgerError, Services};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pearl-ledger")]
#[command(about = "Economy core for Pearl Verse: balances, claims, levels and transfers")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "PEARL_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "PEARL_LEDGER_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create storage directory, default config and database
    Init,

    /// Open an account with the starting bonus
    OpenAccount {
        username: String,
        #[arg(long)]
        email: Option<String>,
        /// Referral code of the inviting account
        #[arg(long)]
        referral_code: Option<String>,
    },

    /// Claim today's (UTC) daily reward
    ClaimDaily { account_id: String },

    /// Show streak and the 7-day schedule
    DailyStatus {
        account_id: String,
        /// Show the schedule as of this UTC date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Claim a battle pass tier, or show progress without a tier
    ClaimTier {
        account_id: String,
        tier: Option<i32>,
    },

    /// Apply a referral code to an existing account
    Refer {
        account_id: String,
        referral_code: String,
    },

    /// Buy an item (avatar item or card)
    Purchase {
        account_id: String,
        item_id: String,
        price: i64,
        #[arg(long, default_value = "avatar")]
        kind: PurchaseKind,
    },

    /// Send pearls by wallet address, email or username
    Transfer {
        sender_id: String,
        recipient: String,
        amount: i64,
    },

    /// Ledger entries, newest first
    History {
        account_id: String,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        page_size: i64,
        /// Only entries with this cause tag
        #[arg(long)]
        cause: Option<String>,
    },

    /// Balance, earned/spent totals and level progress
    Stats { account_id: String },

    /// Compare balance and level with the ledger and level curve
    Reconcile { account_id: String },
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("pearl_ledger=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<Config, LedgerError> {
    let storage_dir = args
        .storage_dir
        .clone()
        .unwrap_or_else(pearl_ledger::config::default_storage_dir);
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| storage_dir.join("config.toml"));

    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    // CLI overrides
    if let Some(dir) = &args.storage_dir {
        config.storage_dir = dir.clone();
    }
    Ok(config)
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, LedgerError> {
    Ok(serde_json::to_value(value)?)
}

fn run(command: Command, db: &LedgerDb, services: &Services) -> Result<serde_json::Value, LedgerError> {
    match command {
        Command::Init => to_json(&db.stats()?),

        Command::OpenAccount { username, email, referral_code } => {
            let opened = services.accounts.open_account(&username, email.as_deref())?;
            let referral = match (opened.clone().applied(), referral_code) {
                (Some(account), Some(code)) => Some(services.rewards.register_with_referral(&account.id, &code)?),
                _ => None,
            };
            Ok(serde_json::json!({ "account": to_json(&opened)?, "referral": to_json(&referral)? }))
        }

        Command::ClaimDaily { account_id } => to_json(&services.rewards.claim_daily_reward(&account_id)?),

        Command::DailyStatus { account_id, date } => match date {
            Some(day) => to_json(&services.rewards.daily_claim_status_on(&account_id, day)?),
            None => to_json(&services.rewards.daily_claim_status(&account_id)?),
        },

        Command::ClaimTier { account_id, tier } => match tier {
            Some(tier) => to_json(&services.rewards.claim_battle_pass_tier(&account_id, tier)?),
            None => to_json(&services.rewards.battle_pass_progress(&account_id)?),
        },

        Command::Refer { account_id, referral_code } => {
            to_json(&services.rewards.register_with_referral(&account_id, &referral_code)?)
        }

        Command::Purchase { account_id, item_id, price, kind } => {
            to_json(&services.rewards.purchase(&account_id, &item_id, price, kind)?)
        }

        Command::Transfer { sender_id, recipient, amount } => {
            to_json(&services.transfers.transfer_currency(&sender_id, &recipient, amount)?)
        }

        Command::History { account_id, page, page_size, cause } => to_json(&services.history.get_balance_history(
            &account_id,
            PageRequest::new(page, page_size),
            cause.as_deref(),
        )?),

        Command::Stats { account_id } => Ok(serde_json::json!({
            "wallet": to_json(&services.history.wallet_stats(&account_id)?)?,
            "level": to_json(&services.accounts.account_level_progress(&account_id)?)?,
            "daily": to_json(&services.rewards.daily_claim_history(&account_id, PageRequest::default())?)?,
        })),

        Command::Reconcile { account_id } => to_json(&services.history.reconcile_account(&account_id)?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json)?;

    let config = load_config(&args).context("Failed to load config")?;
    std::fs::create_dir_all(&config.storage_dir)
        .with_context(|| format!("Failed to create {}", config.storage_dir.display()))?;

    if let Command::Init = args.command {
        let config_path = args.config.clone().unwrap_or_else(|| config.config_path());
        if !config_path.exists() {
            config.save(&config_path)?;
            info!(path = %config_path.display(), "Created default config");
        }
    }

    let db_path = config.database_path();
    let db = Arc::new(
        LedgerDb::open(&db_path, &config.db_options())
            .with_context(|| format!("Failed to open ledger at {}", db_path.display()))?,
    );
    info!(database = %db_path.display(), "Ledger ready");

    let services = Services::new(db.clone(), config.rewards.clone())?;
    let listener = spawn_logging_listener(services.events.clone());

    let result = run(args.command, &db, &services);

    // Closing the bus lets the listener drain and stop
    drop(services);
    let _ = listener.await;

    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "Command failed");
            eprintln!("{}", e.public_message());
            std::process::exit(1);
        }
    }
}
