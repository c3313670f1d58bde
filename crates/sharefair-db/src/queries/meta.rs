//! Ledger metadata key-value pairs.

use rusqlite::{Connection, OptionalExtension};

use crate::Result;

/// Highest time-index observed by the ledger.
pub const HIGH_WATER: &str = "high_water";

/// Sum of all dividends paid out.
pub const TOTAL_PAID: &str = "total_paid";

/// Get a metadata value by key.
pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM ledger_meta WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

/// Set a metadata value.
pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO ledger_meta (key, value) VALUES (?1, ?2)",
        rusqlite::params![key, value],
    )?;
    Ok(())
}
