//! SQLite database module for the economy core
//!
//! ## Architecture
//!
//! - Diesel over SQLite, pooled with r2d2
//! - Every mutation runs in an `IMMEDIATE` transaction, which takes the
//!   database write lock up front (SQLite's equivalent of `SELECT ... FOR UPDATE`)
//! - Uniqueness constraints in the schema are the idempotency guard
//!
//! ## Tables
//!
//! - `accounts` - Balance store (currency, experience, cached level)
//! - `claim_records` - Claim ledger, unique per (account, kind, key)
//! - `ledger_entries` - Transaction log, one signed row per currency delta
//! - `referral_links` - Inbound referral per referee

pub mod schema;
pub mod diesel_schema;
pub mod models;
pub mod accounts;
pub mod claims;
pub mod ledger;
pub mod referrals;

use std::path::Path;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LedgerError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Default database file name inside the storage directory
pub const DEFAULT_DATABASE_FILE: &str = "ledger.db";

/// Pool and per-connection settings
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 5000,
        }
    }
}

/// Applied to every connection the pool hands out
#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled SQLite database holding the four ledger tables
pub struct LedgerDb {
    pool: DbPool,
}

impl LedgerDb {
    /// Open or create the ledger database at `db_path`
    pub fn open(db_path: &Path, options: &DbOptions) -> Result<Self, LedgerError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening SQLite ledger at {:?}", db_path);

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(options.pool_size.max(1))
            .connection_customizer(Box::new(ConnectionPragmas {
                busy_timeout_ms: options.busy_timeout_ms,
            }))
            .build(manager)
            .map_err(|e| LedgerError::Pool(format!("Failed to build pool: {}", e)))?;

        let db = Self { pool };

        // WAL lets readers proceed while one writer holds the lock
        db.conn()?
            .batch_execute("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| LedgerError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// Uses a single pooled connection that never expires, since every
    /// `:memory:` connection is its own database.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        debug!("Opening in-memory SQLite ledger");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_customizer(Box::new(ConnectionPragmas { busy_timeout_ms: 0 }))
            .build(manager)
            .map_err(|e| LedgerError::Pool(format!("Failed to build pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), LedgerError> {
        let mut conn = self.conn()?;
        schema::init_schema(&mut conn)
    }

    /// Check out a connection; returned to the pool on drop
    pub fn conn(&self) -> Result<DbConn, LedgerError> {
        self.pool.get().map_err(LedgerError::from)
    }

    /// Run a read closure on a pooled connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, LedgerError>,
    {
        let mut conn = self.conn()?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, LedgerError> {
        use diesel_schema::{accounts, claim_records, ledger_entries, referral_links};

        let mut conn = self.conn()?;
        let account_count: i64 = accounts::table.count().get_result(&mut conn)?;
        let claim_count: i64 = claim_records::table.count().get_result(&mut conn)?;
        let entry_count: i64 = ledger_entries::table.count().get_result(&mut conn)?;
        let referral_count: i64 = referral_links::table.count().get_result(&mut conn)?;

        Ok(DbStats {
            account_count: account_count as u64,
            claim_count: claim_count as u64,
            ledger_entry_count: entry_count as u64,
            referral_count: referral_count as u64,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub account_count: u64,
    pub claim_count: u64,
    pub ledger_entry_count: u64,
    pub referral_count: u64,
}

/// Whether a diesel error is a UNIQUE / PRIMARY KEY violation
pub fn is_unique_violation(err: &DieselError) -> bool {
    matches!(err, DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
}

// ============================================================================
// Pagination
// ============================================================================

/// Largest page a caller may ask for
pub const MAX_PAGE_SIZE: i64 = 100;

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 { 1 }
fn default_page_size() -> i64 { 20 }

impl PageRequest {
    /// Page numbers below 1 become 1, sizes are clamped to 1..=100
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn normalized(self) -> Self {
        Self::new(self.page, self.page_size)
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(default_page(), default_page_size())
    }
}

/// One page of results plus navigation info
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let pages = (total + request.page_size - 1) / request.page_size;
        Self {
            items,
            page: request.page,
            page_size: request.page_size,
            total,
            pages,
            has_prev: request.page > 1,
            has_next: request.page < pages,
        }
    }
}

// Re-exports
pub use models::{Account, ClaimRecord, LedgerEntry, ReferralLink};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_and_stats() {
        let db = LedgerDb::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.account_count, 0);
        assert_eq!(stats.ledger_entry_count, 0);
    }

    #[test]
    fn test_page_request_clamps() {
        let req = PageRequest::new(0, 500);
        assert_eq!(req.page, 1);
        assert_eq!(req.page_size, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
        assert_eq!(PageRequest::new(1, 0).page_size, 1);
    }

    #[test]
    fn test_page_navigation() {
        let page: Page<i32> = Page::new(vec![1, 2], PageRequest::new(2, 2), 5);
        assert_eq!(page.pages, 3);
        assert!(page.has_prev);
        assert!(page.has_next);

        let empty: Page<i32> = Page::new(vec![], PageRequest::new(1, 20), 0);
        assert_eq!(empty.pages, 0);
        assert!(!empty.has_prev);
        assert!(!empty.has_next);
    }
}
