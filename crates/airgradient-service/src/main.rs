//! AirGradient Service - Prometheus bridge for AirGradient monitors.
//!
//! Run with: `cargo run -p airgradient-service`

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use airgradient_service::{AppState, BasicAuth, Config, server};

/// AirGradient Service - Prometheus bridge for AirGradient monitors.
///
/// Every option can also be set through the environment variable shown.
#[derive(Parser, Debug)]
#[command(name = "airgradient-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "AIRGRADIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Public bind address (overrides config).
    #[arg(short, long, env = "LISTEN_ADDR")]
    bind: Option<String>,

    /// Internal bind address serving /metrics without auth (overrides config).
    #[arg(long, env = "INTERNAL_LISTEN_ADDR")]
    internal_bind: Option<String>,

    /// Backup file path (overrides config).
    #[arg(long, env = "BACKUP_FILENAME")]
    backup_file: Option<PathBuf>,

    /// Maximum backup age in seconds for cold-start restore (overrides config).
    #[arg(long, env = "MAX_TIME_DELTA")]
    max_time_delta: Option<i64>,

    /// Require HTTP Basic authentication on the public listener (overrides config).
    #[arg(long, env = "ENABLE_BASIC_AUTH")]
    enable_basic_auth: Option<bool>,

    /// base64(sha256(username)) for Basic auth (overrides config).
    #[arg(long, env = "BASIC_AUTH_USERNAME_HASHED", hide_env_values = true)]
    basic_auth_username_hashed: Option<String>,

    /// base64(sha256(password)) for Basic auth (overrides config).
    #[arg(long, env = "BASIC_AUTH_PASSWORD_HASHED", hide_env_values = true)]
    basic_auth_password_hashed: Option<String>,
}

impl Args {
    /// Apply command-line and environment overrides to `config`.
    fn apply(self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(internal_bind) = self.internal_bind {
            config.server.internal_bind = Some(internal_bind);
        }
        if let Some(path) = self.backup_file {
            config.backup.path = path;
        }
        if let Some(max_time_delta) = self.max_time_delta {
            config.backup.max_time_delta = max_time_delta;
        }
        if let Some(enabled) = self.enable_basic_auth {
            config.security.basic_auth_enabled = enabled;
        }
        if let Some(username) = self.basic_auth_username_hashed {
            config.security.basic_auth_username_hashed = username;
        }
        if let Some(password) = self.basic_auth_password_hashed {
            config.security.basic_auth_password_hashed = password;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("airgradient_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    args.apply(&mut config);
    config.validate()?;

    let auth = BasicAuth::from_config(&config.security)?;
    if auth.is_none() {
        warn!("Basic auth disabled; the public listener accepts anonymous requests");
    }

    info!(
        "Backup file {:?} (restore window {}s)",
        config.backup.path, config.backup.max_time_delta
    );
    let state = AppState::new(config);

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    server::serve(state, auth, shutdown).await?;

    info!("Shut down");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
        _ = shutdown.cancelled() => return,
    }

    info!("Shutting down http servers...");
    shutdown.cancel();
}
