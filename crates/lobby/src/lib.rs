//! # Lobby Server - Main Entry Point
//!
//! Plain-text TCP relay and lobby server. This crate handles CLI parsing,
//! configuration loading, logging and application lifecycle around the
//! `lobby_server` core.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! lobby
//!
//! # Specify custom configuration
//! lobby --config production.toml
//!
//! # Override specific settings
//! lobby --port 9000 --name "Friday Night" --log-level debug
//!
//! # JSON logging for production
//! lobby --json-logs
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! The server handles graceful shutdown on:
//! - SIGINT (Ctrl+C)
//! - SIGTERM (Unix systems)
//!
//! A second signal during shutdown exits immediately.

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod signals;

use app::{apply_cli_overrides, Application};
use cli::CliArgs;
use config::AppConfig;

/// Main entry point for the lobby server.
///
/// Handles the complete application lifecycle including:
/// 1. Command-line argument parsing
/// 2. Configuration loading and validation
/// 3. Logging system initialization
/// 4. Application creation and execution
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config = match AppConfig::load_from_file(&args.config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "❌ Failed to load configuration from {}: {e}",
                args.config_path.display()
            );
            std::process::exit(1);
        }
    };

    // Logging needs the CLI level and format before the application exists
    let mut logging_config = config.clone();
    apply_cli_overrides(&mut logging_config, &args);
    if let Err(e) = logging::setup_logging(&logging_config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(config, &args) {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{LoggingSettings, NetworkSettings, ServerSettings, SessionSettings};
