//! # relay
//!
//! Chat relay binary: opens the message store and serves the WebSocket hub.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::ServerConfig;
use relay_store::{Database, MessageRepo};
use relay_telemetry::{LogFormat, TelemetryConfig};
use tracing::Level;

/// Real-time chat relay.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "WebSocket chat relay")]
struct Cli {
    /// Host to bind.
    #[arg(long, env = "RELAY_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, env = "RELAY_PORT", default_value_t = 8080)]
    port: u16,

    /// Path to the SQLite message database.
    #[arg(long, env = "RELAY_DB_PATH", default_value = "./chat.db")]
    db_path: PathBuf,

    /// Frames buffered per connection before a slow client is dropped.
    #[arg(long, env = "RELAY_QUEUE_CAPACITY", default_value_t = 256)]
    queue_capacity: usize,

    /// Messages returned by /history.
    #[arg(long, env = "RELAY_HISTORY_LIMIT", default_value_t = 50)]
    history_limit: usize,

    /// Largest inbound WebSocket frame in bytes; bigger frames close the connection.
    #[arg(long, env = "RELAY_MAX_MESSAGE_SIZE", default_value_t = 64 * 1024)]
    max_message_size: usize,

    /// Log output format: json or pretty.
    #[arg(long, env = "RELAY_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    /// Default log level; RUST_LOG takes precedence.
    #[arg(long, env = "RELAY_LOG_LEVEL", default_value = "info")]
    log_level: Level,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            outbound_queue_capacity: self.queue_capacity,
            history_limit: self.history_limit,
            max_message_size: self.max_message_size,
        }
    }

    fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.log_level,
            format: self.log_format,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    relay_telemetry::init_telemetry(&cli.telemetry_config())
        .context("Failed to initialize logging")?;

    let db = Database::open(&cli.db_path)
        .with_context(|| format!("Failed to open database: {}", cli.db_path.display()))?;
    let db_path = db.path().to_owned();
    let store = Arc::new(MessageRepo::new(db));

    let handle = relay_server::start(cli.server_config(), store)
        .await
        .context("Failed to start server")?;
    tracing::info!(addr = %handle.local_addr(), db = %db_path.display(), "relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    handle.shutdown();
    handle.wait().await;
    tracing::info!("relay stopped");
    Ok(())
}
