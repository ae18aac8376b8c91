//! # vitrine - minimal display server
//!
//! Starts the control-plane server on a fresh session, optionally launches a
//! client with the session token in its environment, and runs the frame loop
//! until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use vitrine::compositor::{Compositor, LogPresenter};
use vitrine::config::VitrineConfig;
use vitrine::server::Server;
use vitrine::session::{Session, SESSION_ENV};

#[derive(Parser, Debug)]
#[command(name = "vitrine")]
#[command(about = "A minimal display server brokering windows, input and GPU buffers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/vitrine/vitrine.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Directory for the control and event sockets
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Frame loop rate
    #[arg(long)]
    max_fps: Option<u32>,

    /// Client to launch once the server is up
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration before logging so `general.debug` can pick the filter
    let loaded = VitrineConfig::load(&cli.config);
    let debug = cli.debug || loaded.as_ref().map_or(false, |config| config.general.debug);

    // Initialize logging
    if debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🚀 Starting vitrine");
    info!(
        "📄 Version: {} ({} {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT"),
        env!("TARGET_TRIPLE"),
        env!("BUILD_DATE")
    );

    let config = match loaded {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {:#}", e);
            info!("📝 Using default configuration");
            VitrineConfig::default()
        }
    };

    let config = apply_overrides(config, &cli)?;

    let session = Session::create(&config.server.runtime_dir);
    info!("🔑 Session token: {}", session.token());

    let server = Server::create(session.clone(), &config).context("Failed to start server")?;

    if let Some((program, args)) = cli.command.split_first() {
        let delay = Duration::from_millis(config.general.launch_delay_ms);
        tokio::spawn(launch_client(
            program.clone(),
            args.to_vec(),
            session.token().to_string(),
            delay,
        ));
    }

    info!("✨ vitrine is ready");

    let compositor = Compositor::new(config, server, Box::<LogPresenter>::default());
    compositor.run().await?;

    info!("👋 vitrine shutting down");
    Ok(())
}

/// Override config with CLI flags
fn apply_overrides(mut config: VitrineConfig, cli: &Cli) -> Result<VitrineConfig> {
    if cli.debug {
        config.general.debug = true;
    }
    if let Some(dir) = &cli.runtime_dir {
        info!("📁 Runtime directory overridden: {}", dir.display());
        config.server.runtime_dir = dir.clone();
    }
    if let Some(fps) = cli.max_fps {
        config.general.max_fps = fps;
    }

    config.validate().context("Invalid command line overrides")?;
    Ok(config)
}

/// Start the client with the session token in its environment and report
/// how it exits.
async fn launch_client(program: String, args: Vec<String>, token: String, delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    info!("🚀 Launching client: {} {}", program, args.join(" "));
    let spawned = tokio::process::Command::new(&program)
        .args(&args)
        .env(SESSION_ENV, &token)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            error!("❌ Failed to launch {}: {}", program, e);
            return;
        }
    };

    match child.wait().await {
        Ok(status) if status.success() => info!("Client {} exited", program),
        Ok(status) => warn!("⚠️ Client {} exited with {}", program, status),
        Err(e) => error!("❌ Failed to wait for {}: {}", program, e),
    }
}
