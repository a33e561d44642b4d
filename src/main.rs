//! dirk-wallet - list the accounts of a distributed wallet
//!
//! Opens the configured wallet on its signer nodes and prints every account
//! a majority of the nodes holds.
//!
//! # Usage
//!
//! ```bash
//! dirk-wallet --config /etc/dirk-wallet/config.toml
//!
//! # Or from the environment
//! DIRK_WALLET__WALLET__NAME="Wallet 1" dirk-wallet
//! ```

use dirk_wallet::config::{Config, LoggingConfig};
use dirk_wallet::{RequestContext, Result, Wallet};
use std::env;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path();
    let config = Config::load(config_path.as_deref())?;

    init_logging(&config.logging);
    info!("Starting dirk-wallet v{}", VERSION);

    config.validate()?;
    let credentials = config.credentials()?;

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(token.clone()));
    let ctx = RequestContext::with_token(token);

    let wallet = Wallet::open_with_options(
        &ctx,
        &config.wallet.name,
        &credentials,
        config.endpoints.clone(),
        config.wallet_options(),
    )
    .await?;

    let accounts = match wallet.accounts(&ctx).await {
        Ok(accounts) => accounts,
        Err(e) => {
            error!("Failed to list accounts of \"{}\": {}", wallet.name(), e);
            return Err(e);
        }
    };

    info!("Wallet \"{}\" holds {} account(s)", wallet.name(), accounts.len());
    for account in &accounts {
        println!(
            "{}\t{}\t0x{}",
            account.name(),
            account.id(),
            hex::encode(account.public_key())
        );
    }

    Ok(())
}

/// `dirk-wallet [--config] <path>`
fn config_path() -> Option<String> {
    let mut args = env::args().skip(1);
    match args.next() {
        Some(flag) if flag == "--config" => args.next(),
        other => other,
    }
}

/// Initialize logging; `RUST_LOG` overrides the configured level
fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Cancel in-flight requests on Ctrl+C
async fn cancel_on_ctrl_c(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, cancelling...");
            token.cancel();
        }
        Err(e) => warn!("Could not install Ctrl+C handler: {}", e),
    }
}
