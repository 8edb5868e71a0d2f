//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel::sqlite::SqliteConnection;
use tracing::info;

use crate::error::LedgerError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
}

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new ledger schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Ledger schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, LedgerError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .map_err(|e| LedgerError::Database(format!("Failed to create schema_version table: {}", e)))?;

    let rows: Vec<VersionRow> = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .load(conn)
        .map_err(|e| LedgerError::Database(format!("Failed to read schema_version: {}", e)))?;

    Ok(rows.first().map(|r| r.version).unwrap_or(0))
}

/// Set schema version
fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), LedgerError> {
    conn.batch_execute(&format!(
        "DELETE FROM schema_version; INSERT INTO schema_version (version) VALUES ({});",
        version
    ))
    .map_err(|e| LedgerError::Database(format!("Failed to set schema_version: {}", e)))
}

/// Create all tables
fn create_tables(conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    conn.batch_execute(ACCOUNTS_SCHEMA)
        .map_err(|e| LedgerError::Database(format!("Failed to create accounts table: {}", e)))?;

    conn.batch_execute(CLAIMS_SCHEMA)
        .map_err(|e| LedgerError::Database(format!("Failed to create claim tables: {}", e)))?;

    conn.batch_execute(LEDGER_SCHEMA)
        .map_err(|e| LedgerError::Database(format!("Failed to create ledger tables: {}", e)))?;

    conn.batch_execute(INDEXES_SCHEMA)
        .map_err(|e| LedgerError::Database(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &mut SqliteConnection, from_version: i32) -> Result<(), LedgerError> {
    // No released version predates v1 yet
    info!(from_version, "No migration steps registered");
    set_schema_version(conn, SCHEMA_VERSION)
}

/// Balance store
const ACCOUNTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY NOT NULL,
    username TEXT NOT NULL UNIQUE,
    email TEXT UNIQUE,
    wallet_address TEXT NOT NULL UNIQUE,
    referral_code TEXT NOT NULL UNIQUE,

    -- Currency and cumulative experience, never negative
    balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
    experience INTEGER NOT NULL DEFAULT 0 CHECK (experience >= 0),

    -- Cached level_for(experience)
    level INTEGER NOT NULL DEFAULT 1 CHECK (level >= 1),

    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
"#;

/// Claim ledger (idempotency) and referral links
const CLAIMS_SCHEMA: &str = r#"
-- One row per granted claim. The unique key is what rejects a second grant,
-- including two requests racing outside the account lock.
CREATE TABLE IF NOT EXISTS claim_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL,
    claim_kind TEXT NOT NULL CHECK (claim_kind IN ('daily', 'battle_pass')),
    claim_key TEXT NOT NULL,
    currency_granted INTEGER NOT NULL DEFAULT 0,
    experience_granted INTEGER NOT NULL DEFAULT 0,
    streak_position INTEGER,
    claimed_at TEXT NOT NULL,

    UNIQUE (account_id, claim_kind, claim_key),
    FOREIGN KEY (account_id) REFERENCES accounts(id)
);

-- At most one inbound referral per account, ever
CREATE TABLE IF NOT EXISTS referral_links (
    referee_id TEXT PRIMARY KEY NOT NULL,
    referrer_id TEXT NOT NULL,
    code_used TEXT NOT NULL,
    bonus_granted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,

    FOREIGN KEY (referee_id) REFERENCES accounts(id),
    FOREIGN KEY (referrer_id) REFERENCES accounts(id)
);
"#;

/// Transaction log
const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL,
    cause TEXT NOT NULL,
    amount INTEGER NOT NULL,
    counterparty_id TEXT,
    description TEXT NOT NULL DEFAULT '',
    reference TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,

    FOREIGN KEY (account_id) REFERENCES accounts(id),
    FOREIGN KEY (counterparty_id) REFERENCES accounts(id)
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_claims_account_kind ON claim_records(account_id, claim_kind, claim_key);
CREATE INDEX IF NOT EXISTS idx_ledger_account_created ON ledger_entries(account_id, created_at);
CREATE INDEX IF NOT EXISTS idx_ledger_account_cause ON ledger_entries(account_id, cause);
CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referral_links(referrer_id);
"#;
