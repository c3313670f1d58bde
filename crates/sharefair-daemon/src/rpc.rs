//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! newline-delimited JSON-RPC method calls to the command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sharefair_db::DbError;
use sharefair_ledger::LedgerError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use crate::book::BookError;
use crate::commands;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            -32601,
            "METHOD_NOT_FOUND",
            Some(serde_json::json!({"method": method})),
        )
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(
            -32602,
            "INVALID_PARAMS",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::new(
            -32603,
            "INTERNAL_ERROR",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    // Ledger errors

    /// Insufficient balance (-32040).
    pub fn insufficient_balance(required: u128, available: u128) -> Self {
        Self::new(
            -32040,
            "INSUFFICIENT_BALANCE",
            Some(serde_json::json!({
                "required": required.to_string(),
                "available": available.to_string(),
            })),
        )
    }

    /// Insufficient allowance (-32041).
    pub fn insufficient_allowance(required: u128, available: u128) -> Self {
        Self::new(
            -32041,
            "INSUFFICIENT_ALLOWANCE",
            Some(serde_json::json!({
                "required": required.to_string(),
                "available": available.to_string(),
            })),
        )
    }

    /// Invalid premium (-32042).
    pub fn invalid_premium(fraction: u32) -> Self {
        Self::new(
            -32042,
            "INVALID_PREMIUM",
            Some(serde_json::json!({"fraction": fraction, "max": 255})),
        )
    }

    /// Unauthorized (-32043).
    pub fn unauthorized(caller: &str, account: &str) -> Self {
        Self::new(
            -32043,
            "UNAUTHORIZED",
            Some(serde_json::json!({"caller": caller, "account": account})),
        )
    }

    /// Consistency violation (-32050).
    pub fn consistency_violation(time_index: u64) -> Self {
        Self::new(
            -32050,
            "CONSISTENCY_VIOLATION",
            Some(serde_json::json!({"time_index": time_index})),
        )
    }

    /// Arithmetic overflow (-32051).
    pub fn arithmetic_overflow() -> Self {
        Self::new(-32051, "ARITHMETIC_OVERFLOW", None)
    }

    /// Clock moved backwards (-32052).
    pub fn non_monotonic_time(last: u64, new: u64) -> Self {
        Self::new(
            -32052,
            "NON_MONOTONIC_TIME",
            Some(serde_json::json!({"last": last, "new": new})),
        )
    }

    /// Payout rejected (-32053).
    pub fn payout_failed(detail: &str) -> Self {
        Self::new(
            -32053,
            "PAYOUT_FAILED",
            Some(serde_json::json!({"detail": detail})),
        )
    }
}

impl From<LedgerError> for RpcError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                available,
                required,
            } => Self::insufficient_balance(required, available),
            LedgerError::InsufficientAllowance {
                available,
                required,
            } => Self::insufficient_allowance(required, available),
            LedgerError::InvalidPremium(fraction) => Self::invalid_premium(fraction),
            LedgerError::Unauthorized { caller, account } => {
                Self::unauthorized(&caller.to_string(), &account.to_string())
            }
            LedgerError::ConsistencyViolation { time_index } => {
                Self::consistency_violation(time_index)
            }
            LedgerError::ArithmeticOverflow => Self::arithmetic_overflow(),
            LedgerError::NonMonotonicTime { last, new } => Self::non_monotonic_time(last, new),
            LedgerError::Payout(e) => Self::payout_failed(&e.to_string()),
            LedgerError::InvalidSnapshot(detail) => Self::internal_error(&detail),
        }
    }
}

impl From<DbError> for RpcError {
    fn from(err: DbError) -> Self {
        Self::internal_error(&format!("db error: {err}"))
    }
}

impl From<BookError> for RpcError {
    fn from(err: BookError) -> Self {
        match err {
            BookError::Ledger(e) => e.into(),
            BookError::Db(e) => e.into(),
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => dispatch_request(&state, request).await,
            Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub async fn dispatch_request(state: &Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }

    let method = request.method.as_str();
    let params = &request.params;
    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Share commands
        "transfer" => commands::shares::transfer(state, params).await,
        "transfer_from" => commands::shares::transfer_from(state, params).await,
        "approve" => commands::shares::approve(state, params).await,
        "get_balance" => commands::shares::get_balance(state, params).await,
        "get_total_supply" => commands::shares::get_total_supply(state).await,
        "get_past_shares" => commands::shares::get_past_shares(state, params).await,
        "get_past_total_shares" => commands::shares::get_past_total_shares(state, params).await,
        "get_allowance" => commands::shares::get_allowance(state, params).await,

        // Revenue and dividend commands
        "receive" => commands::dividends::receive(state, params).await,
        "set_premium" => commands::dividends::set_premium(state, params).await,
        "harvest_batch" => commands::dividends::harvest_batch(state, params).await,
        "get_premium" => commands::dividends::get_premium(state, params).await,
        "get_revenue" => commands::dividends::get_revenue(state, params).await,
        "get_pending_dividends" => {
            commands::dividends::get_pending_dividends(state, params).await
        }
        "get_harvests" => commands::dividends::get_harvests(state, params).await,

        // Value asset commands
        "get_value_balance" => commands::values::get_value_balance(state, params).await,
        "get_ledger_status" => commands::values::get_ledger_status(state).await,
        "deposit_value" => commands::values::deposit_value(state, params).await,
        "withdraw_value" => commands::values::withdraw_value(state, params).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => {
            debug!(method, code = err.code, "RPC call failed: {}", err.message);
            RpcResponse::error(id, err)
        }
    }
}
