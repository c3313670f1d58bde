//! sharefair-daemon: hosts a sharefair ledger behind a local JSON-RPC socket.
//!
//! Single OS process running a Tokio async runtime. Clients talk to the
//! daemon with newline-delimited JSON-RPC over a Unix socket; every
//! mutation is persisted to SQLite before it is acknowledged.

mod book;
mod clock;
mod commands;
mod config;
mod events;
mod rpc;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::book::Book;
use crate::clock::Clock;
use crate::config::DaemonConfig;
use crate::events::{EventBus, EventKind};
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Ledger, value balances, and their database.
    pub book: Mutex<Book>,
    /// Configuration.
    pub config: DaemonConfig,
    /// Wall-clock to time-index mapping.
    pub clock: Clock,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
}

impl DaemonState {
    /// Assemble the shared state.
    pub fn new(config: DaemonConfig, book: Book) -> Self {
        Self {
            book: Mutex::new(book),
            clock: Clock::new(config.ledger.time_slot_secs),
            event_bus: EventBus::new(config.advanced.event_buffer),
            config,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing (RUST_LOG wins over the config file)
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("sharefair={}", config.advanced.log_level))
    })?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("sharefair daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 3. Open database and load the ledger
    let conn = sharefair_db::open(&data_dir.join("sharefair.db"))?;
    let mut book = Book::load(conn)?;

    // 4. Genesis issuance on first start
    let clock = Clock::new(config.ledger.time_slot_secs);
    let supply = config.ledger.initial_supply()?;
    match config.ledger.issuer()? {
        Some(issuer) => {
            let now = clock.now(book.ledger().high_water());
            book.ensure_genesis(now, issuer, supply)?;
        }
        None if supply > 0 && book.ledger().shares().supply_history().is_empty() => {
            anyhow::bail!("ledger.initial_supply is set but ledger.issuer is empty");
        }
        None => {}
    }

    // 5. Build daemon state
    let socket_path = config.socket_path();
    let state = Arc::new(DaemonState::new(config, book));

    // 6. Log every event at debug level
    let mut events = state.event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(
                    kind = ?event.kind,
                    sequence = event.sequence,
                    time_index = event.time_index,
                    payload = %event.payload,
                    "event"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let now = {
        let book = state.book.lock().await;
        state.clock.now(book.ledger().high_water())
    };
    state.event_bus.emit(
        EventKind::DaemonStarted,
        now,
        serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
    );

    // 7. Run the RPC server until shutdown
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
    info!("Starting JSON-RPC server on {:?}", socket_path);

    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
