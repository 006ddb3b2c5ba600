// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::io::BufRead;
use std::sync::Arc;

use clap::Parser;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use credential_escrow::{
    api::router,
    cli::{console_key_digest, new_seal_key, Cli, Command},
    config::{EscrowConfig, LogFormat, DEFAULT_LOG_FILTER},
    notify::{LogGateway, NotificationGateway, WebhookGateway, DEFAULT_WEBHOOK_TIMEOUT},
    state::AppState,
    storage::EscrowDb,
    sweeper::ExpirySweeper,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run().await,
        Command::GenSealKey => new_seal_key()
            .map(|key| println!("{key}"))
            .map_err(BoxError::from),
        Command::HashConsoleKey { iterations } => hash_console_key(iterations),
    };
    if let Err(e) = result {
        error!(error = %e, "Credential escrow failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn hash_console_key(iterations: u32) -> Result<(), BoxError> {
    let mut key = String::new();
    std::io::stdin().lock().read_line(&mut key)?;
    println!("{}", console_key_digest(&key, iterations)?);
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).init(),
    }
}

async fn run() -> Result<(), BoxError> {
    let config = EscrowConfig::from_env()?;
    init_tracing(config.log_format);
    info!(?config, "Configuration loaded");

    std::fs::create_dir_all(&config.data_dir)?;
    let db = Arc::new(EscrowDb::open(&config.db_path())?);

    let gateway: Arc<dyn NotificationGateway> = match &config.notify_webhook_url {
        Some(url) => {
            info!(url = %url, "Delivering notifications by webhook");
            Arc::new(WebhookGateway::new(url, DEFAULT_WEBHOOK_TIMEOUT)?)
        }
        None => {
            warn!("NOTIFY_WEBHOOK_URL not set; notifications are only logged");
            Arc::new(LogGateway)
        }
    };

    let state = AppState::from_config(&config, db, gateway)?;
    if state.moderator_key_hash.is_none() {
        warn!("MODERATOR_KEY_HASH not set; approval console is disabled");
    }

    let shutdown = CancellationToken::new();
    let sweeper = ExpirySweeper::new(state.broker.clone(), state.registrar.clone())
        .with_interval(config.sweep_interval);
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Credential escrow listening (docs at /docs)");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(error = %e, "Failed to listen for shutdown signal");
                    }
                }
                _ = server_shutdown.cancelled() => {}
            }
            info!("Shutdown requested");
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper_handle.await {
        warn!(error = %e, "Expiry sweeper task ended abnormally");
    }
    info!("Credential escrow stopped");
    Ok(())
}
