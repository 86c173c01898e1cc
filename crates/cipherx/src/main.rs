//! CipherX service binary.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{theme::ColorfulTheme, Input};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cipherx::twitter::{ConsumerCredentials, TwitterClient, OOB_CALLBACK};
use cipherx::{build_router, AppState, SystemClock};
use cipherx_config::{interval_from_minutes, AppConfig, TwitterConfig};

/// CipherX - crypto market insights for Twitter/X.
#[derive(Parser)]
#[command(name = "cipherx")]
#[command(about = "Crypto market tweet drafting and posting service")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Listen port (overrides PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Minutes between automatic posts (overrides POST_INTERVAL_MINUTES)
        #[arg(long)]
        interval_minutes: Option<u64>,

        /// Start automatic posting immediately
        #[arg(long, env = "CIPHERX_AUTOSTART")]
        autostart: bool,
    },

    /// Obtain an access token interactively with the PIN flow
    Token,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    match cli.command {
        Commands::Serve {
            port,
            interval_minutes,
            autostart,
        } => run_serve(port, interval_minutes, autostart).await,
        Commands::Token => run_token().await,
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("cipherx=debug,tower_http=debug,info")
        } else {
            EnvFilter::new("cipherx=info,warn")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn run_serve(port: Option<u16>, interval_minutes: Option<u64>, autostart: bool) -> Result<()> {
    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(minutes) = interval_minutes {
        config.post_interval =
            interval_from_minutes(minutes).context("Invalid --interval-minutes")?;
    }

    let port = config.port;
    info!(
        port,
        app_url = %config.app_url,
        interval_minutes = config.post_interval.as_secs() / 60,
        twitter_configured = config.twitter.consumer().is_some(),
        "Starting CipherX"
    );

    let state = AppState::from_config(config, Arc::new(SystemClock));
    let bot = state.bot.clone();
    if autostart {
        bot.start();
    }

    let app = build_router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    bot.stop();
    info!("CipherX stopped");
    Ok(())
}

async fn run_token() -> Result<()> {
    let twitter = TwitterConfig::from_env();
    let Some((key, secret)) = twitter.consumer() else {
        bail!("X_API_KEY and X_API_SECRET must be set");
    };
    let client = TwitterClient::new(ConsumerCredentials::new(key, secret), &twitter.base_url);

    let request = client
        .request_token(OOB_CALLBACK)
        .await
        .map_err(|f| anyhow::anyhow!("{f} ({})", f.reason()))?;

    println!("Open this URL, authorize the app, then enter the PIN shown:");
    println!("\n  {}\n", client.authorize_url(&request));

    let pin: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("PIN")
        .interact_text()
        .context("Failed to read PIN")?;

    let access = client
        .access_token(&request, pin.trim())
        .await
        .map_err(|f| anyhow::anyhow!("{f} ({})", f.reason()))?;

    if let Some(name) = &access.screen_name {
        info!(screen_name = %name, "Authorized");
    } else {
        warn!("Authorized, but no screen name was returned");
    }
    println!("X_ACCESS_TOKEN={}", access.token);
    println!("X_ACCESS_TOKEN_SECRET={}", access.secret);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
