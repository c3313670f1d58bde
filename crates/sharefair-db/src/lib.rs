//! # sharefair-db
//!
//! SQLite persistence for the sharefair ledger.
//!
//! ## Schema
//!
//! - WAL mode
//! - Schema version stored in `PRAGMA user_version`
//! - Time-indexes are `INTEGER`; amounts are decimal `TEXT` because they
//!   exceed SQLite's 64-bit integers
//! - Every table except premiums, allowances, and value balances is
//!   append-only, mirroring the ledger

pub mod migrations;
pub mod queries;
pub mod schema;

use std::path::Path;

use rusqlite::Connection;
use sharefair_ledger::LedgerError;
use sharefair_types::{AccountId, Amount, TimeIndex};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("stored ledger is invalid: {0}")]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the ledger database at the given path.
///
/// Configures WAL mode and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = FULL;",
    )?;
    Ok(())
}

// Column codecs shared by the query modules.

pub(crate) fn amount_to_sql(amount: Amount) -> String {
    amount.to_string()
}

pub(crate) fn amount_from_sql(text: &str) -> Result<Amount> {
    text.parse()
        .map_err(|e| DbError::Corrupt(format!("amount {text:?}: {e}")))
}

pub(crate) fn time_to_sql(time_index: TimeIndex) -> Result<i64> {
    i64::try_from(time_index)
        .map_err(|_| DbError::Corrupt(format!("time-index {time_index} exceeds INTEGER range")))
}

pub(crate) fn time_from_sql(value: i64) -> Result<TimeIndex> {
    u64::try_from(value).map_err(|_| DbError::Corrupt(format!("negative time-index {value}")))
}

pub(crate) fn account_from_sql(bytes: &[u8]) -> Result<AccountId> {
    AccountId::from_slice(bytes).map_err(|e| DbError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let conn = open_memory().expect("open in-memory db");
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("get user_version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_wal_mode() {
        let conn = open_memory().expect("open");
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("get journal_mode");
        // In-memory databases use "memory" mode, not WAL
        assert!(mode == "wal" || mode == "memory");
    }

    #[test]
    fn test_amount_codec() {
        let big = 1_000_000u128 * 1_000_000_000_000_000_000;
        assert_eq!(amount_from_sql(&amount_to_sql(big)).expect("decode"), big);
        assert!(amount_from_sql("-1").is_err());
    }

    #[test]
    fn test_time_codec() {
        assert_eq!(time_to_sql(42).expect("encode"), 42);
        assert!(time_to_sql(u64::MAX).is_err());
        assert!(time_from_sql(-1).is_err());
    }
}
