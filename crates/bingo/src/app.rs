//! Application lifecycle: configuration, server startup and shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{shutdown_on_signal, wait_for_shutdown_signal},
};
use bingo_server::{BingoServer, ConnectionRegistry, ShutdownState};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// How long the server task gets to wind down after shutdown is initiated.
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(8);

/// Interval between live session reports.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// The running bingo application.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Bingo server instance
    server: BingoServer,
}

impl Application {
    /// Loads configuration, applies CLI overrides, validates, and builds the
    /// server.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if args.danger_allow_fake_auth {
            config.server.allow_fake_auth = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server = BingoServer::new(config.to_server_config()?, config.to_services());

        Ok(Self { config, server })
    }

    /// Runs the server until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting bingo server application");
        self.log_configuration_summary();

        let registry = self.server.registry();
        let shutdown_state = ShutdownState::new();

        let server_handle = {
            let server = self.server;
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move {
                match server.start_with_shutdown_state(shutdown_state).await {
                    Ok(()) => info!("✅ Server completed successfully"),
                    Err(e) => {
                        error!("❌ Server error: {}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        let monitoring_handle = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(STATS_INTERVAL);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    info!("📊 {} live session(s)", registry.len().await);
                }
            })
        };

        info!("✅ Bingo server is now running on {}", self.config.server.bind_address);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        shutdown_on_signal(&shutdown_state).await?;

        // A second signal skips the graceful path
        tokio::spawn(async {
            if let Err(e) = wait_for_shutdown_signal().await {
                error!("Failed to set up forced shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown signal received again, exiting immediately");
            std::process::exit(1);
        });

        monitoring_handle.abort();

        info!("⏳ Waiting for the accept loop to stop...");
        match tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, server_handle).await {
            Ok(_) => info!("✅ Server task completed gracefully"),
            Err(_) => warn!("⏰ Server task did not complete within timeout, proceeding with cleanup"),
        }

        log_final_statistics(&registry).await;
        info!("👋 Bingo server shutdown complete");
        Ok(())
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!("  🎲 Seed prefix: {}", self.config.game.seed.prefix);
        info!("  🃏 Cell texts: {}", self.config.game.bingo.len());
        info!("  🔑 Known users: {}", self.config.auth.users.len());
        info!("  🔁 Duplicate sessions: {:?}", self.config.server.duplicate_sessions);
        if self.config.notifications.enabled {
            info!("  📣 Notifications: channel {}", self.config.notifications.channel);
        } else {
            info!("  📣 Notifications: disabled");
        }
        if self.config.server.allow_fake_auth {
            warn!("  ⚠️ fakeAuth: ENABLED");
        }
    }
}

async fn log_final_statistics(registry: &Arc<ConnectionRegistry>) {
    info!("📊 Final Statistics:");
    info!("  - Live sessions at shutdown: {}", registry.len().await);
}
