//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that applies CLI overrides,
//! starts the lobby server, reports status periodically and drives the
//! graceful shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, wait_for_signal},
};
use lobby_server::{LobbyServer, ShutdownState, StatusSnapshot};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

/// How long to wait for the accept loop to finish after shutdown begins.
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(8);

/// Main application struct.
///
/// # Architecture
///
/// * **Configuration Management**: Merges the config file with CLI overrides
/// * **Server Orchestration**: Owns the lobby server instance
/// * **Status Reporting**: Logs a status snapshot on a fixed interval
/// * **Graceful Shutdown**: Handles termination signals and cleanup
pub struct Application {
    /// Effective configuration after CLI overrides
    config: AppConfig,
    /// Lobby server instance
    server: Arc<LobbyServer>,
}

impl Application {
    /// Creates a new application from an already loaded configuration.
    ///
    /// # Process
    ///
    /// 1. Apply command-line argument overrides
    /// 2. Validate merged configuration
    /// 3. Display startup banner
    /// 4. Initialize the lobby server with the configuration
    pub fn new(mut config: AppConfig, args: &CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        apply_cli_overrides(&mut config, args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server_config = config.to_server_config()?;
        let server = Arc::new(LobbyServer::new(server_config));

        info!("📂 Config: {}", args.config_path.display());

        Ok(Self { config, server })
    }

    pub fn server(&self) -> &Arc<LobbyServer> {
        &self.server
    }

    /// Runs the server until a termination signal arrives.
    ///
    /// # Errors
    ///
    /// Fails if the listening address cannot be bound or signal handlers
    /// cannot be installed. Errors inside individual connections never
    /// reach this level.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting lobby server application");
        self.log_configuration_summary();

        let listener = self.server.bind().await?;
        let shutdown_state = ShutdownState::new();

        let server_handle = {
            let server = Arc::clone(&self.server);
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move {
                match server.serve(listener, shutdown_state).await {
                    Ok(()) => info!("✅ Server completed successfully"),
                    Err(e) => error!("❌ Server error: {:?}", e),
                }
            })
        };

        let monitoring_handle = self.spawn_status_reporter();

        info!("✅ Lobby server is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        setup_signal_handlers(&shutdown_state).await?;

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        if let Some(handle) = monitoring_handle {
            handle.abort();
        }

        info!("⏳ Waiting for the accept loop and open connections to close...");
        if tokio::time::timeout(SERVER_STOP_TIMEOUT, server_handle)
            .await
            .is_err()
        {
            warn!("⏰ Server task did not complete within timeout, proceeding with shutdown");
        }

        log_final_statistics(&self.server.status());
        info!("👋 Lobby server shutdown complete");
        Ok(())
    }

    fn spawn_status_reporter(&self) -> Option<tokio::task::JoinHandle<()>> {
        let period_secs = self.config.server.status_interval_secs;
        if period_secs == 0 {
            info!("⏸️ Periodic status reports disabled");
            return None;
        }

        let server = Arc::clone(&self.server);
        let json = self.config.logging.json_format;
        info!("🔍 Status reports every {} seconds", period_secs);

        Some(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(period_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                log_status(&server.status(), json);
            }
        }))
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  🏷️ Server name: {}", self.config.server.name);
        info!(
            "  👥 Max players: {}{}",
            self.config.server.max_players,
            if self.config.server.enforce_max_players {
                " (enforced)"
            } else {
                ""
            }
        );
        info!(
            "  ⏱️ Session start delay: {}ms | finished grace: {}s",
            self.config.sessions.start_delay_ms, self.config.sessions.finished_grace_secs
        );
        info!(
            "  📏 Max line length: {} bytes",
            self.config.network.max_line_length
        );
    }
}

/// Applies command-line overrides on top of the file configuration.
///
/// `--bind` replaces the whole address; `--port` then replaces only the port.
/// A port override on an unparsable address is left for validation to report.
pub fn apply_cli_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(bind_address) = &args.bind_address {
        config.server.bind_address = bind_address.clone();
    }

    if let Some(port) = args.port {
        if let Ok(mut address) = config.server.bind_address.parse::<std::net::SocketAddr>() {
            address.set_port(port);
            config.server.bind_address = address.to_string();
        }
    }

    if let Some(name) = &args.server_name {
        config.server.name = name.clone();
    }

    if let Some(max_players) = args.max_players {
        config.server.max_players = max_players;
    }

    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }

    if args.json_logs {
        config.logging.json_format = true;
    }
}

fn log_status(status: &StatusSnapshot, json: bool) {
    if json {
        match serde_json::to_string(status) {
            Ok(body) => info!(status = %body, "📊 Status report"),
            Err(e) => warn!("Failed to serialize status report: {}", e),
        }
        return;
    }

    info!(
        "📊 Status - {} | ready: {} | sessions total: {} | uptime: {}s",
        status.summary_line(),
        status.ready_players,
        status.total_sessions,
        status.uptime_secs
    );
    if status.player_count > status.max_players {
        warn!(
            "👥 Player count {} is above the configured maximum {}",
            status.player_count, status.max_players
        );
    }
}

/// Logs final statistics during shutdown.
fn log_final_statistics(status: &StatusSnapshot) {
    info!("📊 Final Statistics:");
    info!("  - Players still registered: {}", status.player_count);
    info!("  - Sessions still tracked: {}", status.total_sessions);
    info!("  - Active sessions: {}", status.active_sessions);
    info!("  - Uptime: {}s", status.uptime_secs);
}
