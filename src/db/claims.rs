//! Claim ledger operations
//!
//! A claim is identified by `(account_id, claim_kind, claim_key)`. The UNIQUE
//! constraint on that triple is the final guard against a second grant.

use diesel::prelude::*;

use super::diesel_schema::claim_records;
use super::models::{claim_kinds, ClaimRecord, NewClaimRecord};
use super::{is_unique_violation, PageRequest};
use crate::error::LedgerError;

/// Result of attempting to record a claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimAttempt {
    Claimed(ClaimRecord),
    AlreadyClaimed,
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get one claim by its identifying triple
pub fn find(
    conn: &mut SqliteConnection,
    account_id: &str,
    kind: &str,
    key: &str,
) -> Result<Option<ClaimRecord>, LedgerError> {
    claim_records::table
        .filter(claim_records::account_id.eq(account_id))
        .filter(claim_records::claim_kind.eq(kind))
        .filter(claim_records::claim_key.eq(key))
        .select(ClaimRecord::as_select())
        .first(conn)
        .optional()
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

pub fn exists(conn: &mut SqliteConnection, account_id: &str, kind: &str, key: &str) -> Result<bool, LedgerError> {
    Ok(find(conn, account_id, kind, key)?.is_some())
}

/// Most recent daily claim
///
/// Daily keys are `YYYY-MM-DD`, so lexical order is date order.
pub fn latest_daily(conn: &mut SqliteConnection, account_id: &str) -> Result<Option<ClaimRecord>, LedgerError> {
    claim_records::table
        .filter(claim_records::account_id.eq(account_id))
        .filter(claim_records::claim_kind.eq(claim_kinds::DAILY))
        .order(claim_records::claim_key.desc())
        .select(ClaimRecord::as_select())
        .first(conn)
        .optional()
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

/// Page of claims of one kind, newest first
pub fn list(
    conn: &mut SqliteConnection,
    account_id: &str,
    kind: &str,
    request: PageRequest,
) -> Result<Vec<ClaimRecord>, LedgerError> {
    claim_records::table
        .filter(claim_records::account_id.eq(account_id))
        .filter(claim_records::claim_kind.eq(kind))
        .order((claim_records::claimed_at.desc(), claim_records::id.desc()))
        .limit(request.page_size)
        .offset(request.offset())
        .select(ClaimRecord::as_select())
        .load(conn)
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

pub fn count(conn: &mut SqliteConnection, account_id: &str, kind: &str) -> Result<i64, LedgerError> {
    claim_records::table
        .filter(claim_records::account_id.eq(account_id))
        .filter(claim_records::claim_kind.eq(kind))
        .count()
        .get_result(conn)
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

/// All claim keys of one kind
pub fn claimed_keys(conn: &mut SqliteConnection, account_id: &str, kind: &str) -> Result<Vec<String>, LedgerError> {
    claim_records::table
        .filter(claim_records::account_id.eq(account_id))
        .filter(claim_records::claim_kind.eq(kind))
        .select(claim_records::claim_key)
        .load(conn)
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

/// Total currency granted by claims of one kind
pub fn currency_total(conn: &mut SqliteConnection, account_id: &str, kind: &str) -> Result<i64, LedgerError> {
    let amounts: Vec<i64> = claim_records::table
        .filter(claim_records::account_id.eq(account_id))
        .filter(claim_records::claim_kind.eq(kind))
        .select(claim_records::currency_granted)
        .load(conn)
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))?;
    Ok(amounts.iter().sum())
}

// ============================================================================
// Write Operations
// ============================================================================

/// Record a claim unless its triple already exists
///
/// A UNIQUE violation is reported as `AlreadyClaimed` rather than an error.
/// SQLite aborts only the failing statement, so the surrounding transaction
/// remains usable either way.
pub fn try_claim(conn: &mut SqliteConnection, claim: &NewClaimRecord<'_>) -> Result<ClaimAttempt, LedgerError> {
    if !claim_kinds::is_valid(claim.claim_kind) {
        return Err(LedgerError::Internal(format!("Unknown claim kind: {}", claim.claim_kind)));
    }

    match diesel::insert_into(claim_records::table)
        .values(claim)
        .execute(conn)
    {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => return Ok(ClaimAttempt::AlreadyClaimed),
        Err(e) => return Err(LedgerError::Database(format!("Insert failed: {}", e))),
    }

    find(conn, claim.account_id, claim.claim_kind, claim.claim_key)?
        .map(ClaimAttempt::Claimed)
        .ok_or_else(|| LedgerError::Internal("Failed to retrieve recorded claim".into()))
}
