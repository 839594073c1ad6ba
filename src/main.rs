//! ledger_bridge operator tool
//!
//! Read-only view over the configured coins:
//!
//! ```text
//! ledger_bridge [--env dev] health
//! ledger_bridge [--env dev] balance <SYMBOL> [ACCOUNT] [--memo M] [--case-sensitive]
//! ledger_bridge [--env dev] validate <SYMBOL> <ACCOUNT>
//! ledger_bridge [--env dev] deposit <SYMBOL>
//! ```
//!
//! Keys come from the environment. No signer is wired in, so nothing here
//! can move funds.

use anyhow::{Context, Result, bail};
use std::sync::Arc;

use ledger_bridge::backend::BackendRegistry;
use ledger_bridge::config::AppConfig;
use ledger_bridge::keys::{EnvKeyStore, OfflineSigner};
use ledger_bridge::logging::init_logging;

// ============================================================
// ARGUMENTS
// ============================================================

#[derive(Debug)]
enum Command {
    Health,
    Balance {
        symbol: String,
        account: Option<String>,
        memo: Option<String>,
        case_sensitive: bool,
    },
    Validate {
        symbol: String,
        account: String,
    },
    Deposit {
        symbol: String,
    },
}

struct Args {
    env: String,
    command: Command,
}

const USAGE: &str = "usage: ledger_bridge [--env NAME] <health | balance SYMBOL [ACCOUNT] [--memo M] [--case-sensitive] | validate SYMBOL ACCOUNT | deposit SYMBOL>";

fn parse_args(args: &[String]) -> Result<Args> {
    let mut env = "dev".to_string();
    let mut memo = None;
    let mut case_sensitive = false;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--env" | "-e" => {
                env = iter.next().context("--env needs a value")?.clone();
            }
            "--memo" => {
                memo = Some(iter.next().context("--memo needs a value")?.clone());
            }
            "--case-sensitive" => case_sensitive = true,
            _ => positional.push(arg.clone()),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("health") => Command::Health,
        Some("balance") => Command::Balance {
            symbol: positional.next().context(USAGE)?,
            account: positional.next(),
            memo,
            case_sensitive,
        },
        Some("validate") => Command::Validate {
            symbol: positional.next().context(USAGE)?,
            account: positional.next().context(USAGE)?,
        },
        Some("deposit") => Command::Deposit {
            symbol: positional.next().context(USAGE)?,
        },
        _ => bail!(USAGE),
    };

    Ok(Args { env, command })
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&argv)?;

    let config = AppConfig::load(&args.env)
        .with_context(|| format!("loading config/{}.yaml", args.env))?;
    let _log_guard = init_logging(&config);

    tracing::info!(
        env = %args.env,
        git = env!("GIT_HASH"),
        coins = config.coins.len(),
        "Starting ledger_bridge"
    );

    let keys = Arc::new(EnvKeyStore::new(config.key_env_prefix.clone()));
    let registry = BackendRegistry::from_config(&config, keys, Arc::new(OfflineSigner))?;

    match args.command {
        Command::Health => {
            let mut all_ok = true;
            for report in registry.health_all().await {
                all_ok &= report.status.is_okay();
                println!("== {} ({}) ==", report.symbol, report.manager);
                for field in &report.fields {
                    println!("  {:<14} {}", field.name, field.value);
                }
                println!("  {:<14} {}", "Status", report.status);
            }
            if !all_ok {
                std::process::exit(1);
            }
        }
        Command::Balance {
            symbol,
            account,
            memo,
            case_sensitive,
        } => {
            let backend = registry.get(&symbol)?;
            let balance = backend
                .balance(account.as_deref(), memo.as_deref(), case_sensitive)
                .await?;
            println!("{} {}", balance, backend.symbol());
        }
        Command::Validate { symbol, account } => {
            let backend = registry.get(&symbol)?;
            let valid = backend.address_valid(&account).await;
            println!("{} {}", account, if valid { "valid" } else { "invalid" });
            if !valid {
                std::process::exit(1);
            }
        }
        Command::Deposit { symbol } => {
            let backend = registry.get(&symbol)?;
            match backend.deposit_target() {
                Some(target) => println!("{}", serde_json::to_string(&target)?),
                None => bail!("{} has no platform account to receive deposits", backend.symbol()),
            }
        }
    }

    Ok(())
}
