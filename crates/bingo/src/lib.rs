//! # Bingo Server - Main Entry Point
//!
//! Parses the command line, loads configuration, sets up logging and runs
//! the server until it is told to stop.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration (creates config.toml if missing)
//! bingo
//!
//! # Specify custom configuration
//! bingo --config production.toml
//!
//! # Override specific settings
//! bingo --bind 0.0.0.0:8080 --log-level debug --json-logs
//!
//! # Local development without a credential issuer
//! bingo --danger-allow-fake-auth
//! ```
//!
//! ## Signal Handling
//!
//! SIGINT and SIGTERM (Ctrl+C on Windows) stop the accept loop; a second
//! signal exits immediately.

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

pub use config::{AuthSettings, LoggingSettings, NotificationSettings, ServerSettings};

/// Runs the application from process arguments.
///
/// Called from `main`, which owns the runtime.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging settings are needed before the application logs anything
    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();

    let mut logging = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }

    if let Err(e) = logging::setup_logging(&logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
