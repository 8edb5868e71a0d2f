//! Transaction log operations
//!
//! Entries are append-only. Every balance change writes exactly one signed
//! entry per affected account in the same transaction as the change.

use diesel::prelude::*;
use serde::Serialize;

use super::diesel_schema::ledger_entries;
use super::models::{LedgerEntry, NewLedgerEntry};
use super::PageRequest;
use crate::error::LedgerError;

/// Per-cause totals for one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CauseTotal {
    pub cause: String,
    pub sum: i64,
    pub count: i64,
}

// ============================================================================
// Read Operations
// ============================================================================

/// Page of entries for an account, newest first, optionally filtered by cause
pub fn list(
    conn: &mut SqliteConnection,
    account_id: &str,
    cause: Option<&str>,
    request: PageRequest,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    let mut query = ledger_entries::table
        .filter(ledger_entries::account_id.eq(account_id))
        .into_boxed();

    if let Some(cause) = cause {
        query = query.filter(ledger_entries::cause.eq(cause));
    }

    query
        .order((ledger_entries::created_at.desc(), ledger_entries::id.desc()))
        .limit(request.page_size)
        .offset(request.offset())
        .select(LedgerEntry::as_select())
        .load(conn)
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

pub fn count(conn: &mut SqliteConnection, account_id: &str, cause: Option<&str>) -> Result<i64, LedgerError> {
    let mut query = ledger_entries::table
        .filter(ledger_entries::account_id.eq(account_id))
        .into_boxed();

    if let Some(cause) = cause {
        query = query.filter(ledger_entries::cause.eq(cause));
    }

    query
        .count()
        .get_result(conn)
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

/// All entries sharing a reference (both sides of a transfer)
#[cfg(test)]
pub fn find_by_reference(conn: &mut SqliteConnection, reference: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
    ledger_entries::table
        .filter(ledger_entries::reference.eq(reference))
        .order(ledger_entries::id.asc())
        .select(LedgerEntry::as_select())
        .load(conn)
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

/// Whether the account has any entry with a cause other than `cause`
pub fn has_activity_besides(conn: &mut SqliteConnection, account_id: &str, cause: &str) -> Result<bool, LedgerError> {
    let other: i64 = ledger_entries::table
        .filter(ledger_entries::account_id.eq(account_id))
        .filter(ledger_entries::cause.ne(cause))
        .count()
        .get_result(conn)
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))?;
    Ok(other > 0)
}

/// `(cause, amount)` of every entry for an account, oldest first
pub fn load_amounts(conn: &mut SqliteConnection, account_id: &str) -> Result<Vec<(String, i64)>, LedgerError> {
    ledger_entries::table
        .filter(ledger_entries::account_id.eq(account_id))
        .order(ledger_entries::id.asc())
        .select((ledger_entries::cause, ledger_entries::amount))
        .load(conn)
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

/// Sum and count of entries per cause, in first-seen order
pub fn totals_by_cause(conn: &mut SqliteConnection, account_id: &str) -> Result<Vec<CauseTotal>, LedgerError> {
    Ok(group_by_cause(load_amounts(conn, account_id)?))
}

pub fn group_by_cause(rows: Vec<(String, i64)>) -> Vec<CauseTotal> {
    let mut totals: Vec<CauseTotal> = Vec::new();
    for (cause, amount) in rows {
        match totals.iter_mut().find(|t| t.cause == cause) {
            Some(total) => {
                total.sum += amount;
                total.count += 1;
            }
            None => totals.push(CauseTotal { cause, sum: amount, count: 1 }),
        }
    }
    totals
}

/// Signed sum of every entry for an account
pub fn net_total(conn: &mut SqliteConnection, account_id: &str) -> Result<i64, LedgerError> {
    Ok(totals_by_cause(conn, account_id)?.iter().map(|t| t.sum).sum())
}

// ============================================================================
// Write Operations
// ============================================================================

/// Append one entry and return it as stored
pub fn append(conn: &mut SqliteConnection, entry: &NewLedgerEntry<'_>) -> Result<LedgerEntry, LedgerError> {
    diesel::insert_into(ledger_entries::table)
        .values(entry)
        .execute(conn)
        .map_err(|e| LedgerError::Database(format!("Insert failed: {}", e)))?;

    // Inside the caller's write transaction nobody else can insert, so the
    // highest id for this account is the row just written.
    ledger_entries::table
        .filter(ledger_entries::account_id.eq(entry.account_id))
        .order(ledger_entries::id.desc())
        .select(LedgerEntry::as_select())
        .first(conn)
        .map_err(|e| LedgerError::Database(format!("Failed to retrieve appended entry: {}", e)))
}
