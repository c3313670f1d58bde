//! SQL schema definitions.

/// Complete schema for the v1 ledger database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Share ledger
-- ============================================================

CREATE TABLE IF NOT EXISTS balance_checkpoints (
    account BLOB NOT NULL,
    time_index INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (account, time_index)
);

CREATE TABLE IF NOT EXISTS supply_checkpoints (
    time_index INTEGER PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS allowances (
    owner BLOB NOT NULL,
    spender BLOB NOT NULL,
    amount TEXT NOT NULL,
    PRIMARY KEY (owner, spender)
);

-- ============================================================
-- Revenue and dividends
-- ============================================================

CREATE TABLE IF NOT EXISTS revenue_buckets (
    time_index INTEGER PRIMARY KEY,
    amount TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settlements (
    account BLOB NOT NULL,
    time_index INTEGER NOT NULL,
    PRIMARY KEY (account, time_index)
);

CREATE TABLE IF NOT EXISTS premiums (
    account BLOB PRIMARY KEY,
    fraction INTEGER NOT NULL CHECK (fraction BETWEEN 0 AND 255)
);

CREATE TABLE IF NOT EXISTS harvest_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account BLOB NOT NULL,
    operator BLOB NOT NULL,
    time_index INTEGER NOT NULL,
    settled INTEGER NOT NULL,
    total TEXT NOT NULL,
    premium TEXT NOT NULL,
    net TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_harvest_log_account ON harvest_log(account);

-- ============================================================
-- Value asset and metadata
-- ============================================================

CREATE TABLE IF NOT EXISTS value_balances (
    account BLOB PRIMARY KEY,
    amount TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
