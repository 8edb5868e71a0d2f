//! Atomic reward operation
//!
//! Every balance mutation runs through [`run_atomic`], and single-account
//! rewards through [`execute_reward`], which fixes the order of steps:
//!
//! ```text
//! lock account -> gate -> claim guard -> plan -> apply + verify
//!     -> insert claim record -> append ledger entries -> commit
//! ```
//!
//! Any rejection or fault at any step rolls back the whole transaction.

use diesel::prelude::*;
use tracing::{debug, error, warn};

use super::outcome::{Outcome, Rejection};
use crate::db::claims::{self, ClaimAttempt};
use crate::db::models::{current_timestamp, Account, ClaimRecord, LedgerEntry, NewClaimRecord, NewLedgerEntry};
use crate::db::{accounts, ledger, LedgerDb};
use crate::error::LedgerError;
use crate::progression::LevelCurve;

/// Why a transaction closure stopped
#[derive(Debug)]
pub(crate) enum TxError {
    Rejected(Rejection),
    Fault(LedgerError),
}

impl From<Rejection> for TxError {
    fn from(rejection: Rejection) -> Self {
        TxError::Rejected(rejection)
    }
}

impl From<LedgerError> for TxError {
    fn from(e: LedgerError) -> Self {
        TxError::Fault(e)
    }
}

impl From<diesel::result::Error> for TxError {
    fn from(e: diesel::result::Error) -> Self {
        TxError::Fault(LedgerError::Database(format!("Transaction failed: {}", e)))
    }
}

/// Run `f` inside an `IMMEDIATE` transaction
///
/// The write lock is taken before the first read, so no other writer can
/// interleave with the read-modify-verify sequence. `Err` from `f` rolls
/// back; rejections come back as `Outcome::Rejected`.
pub(crate) fn run_atomic<T, F>(db: &LedgerDb, operation: &'static str, f: F) -> Result<Outcome<T>, LedgerError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, TxError>,
{
    let mut conn = db.conn()?;
    match conn.immediate_transaction(f) {
        Ok(value) => Ok(Outcome::Applied(value)),
        Err(TxError::Rejected(rejection)) => {
            debug!(operation, rejection = %rejection, "Operation rejected");
            Ok(Outcome::Rejected(rejection))
        }
        Err(TxError::Fault(e)) => {
            error!(operation, error = %e, "Operation failed, rolled back");
            Err(e)
        }
    }
}

// ============================================================================
// Account locking
// ============================================================================

/// Read one account for update
pub(crate) fn lock_account(conn: &mut SqliteConnection, account_id: &str) -> Result<Account, TxError> {
    accounts::find(conn, account_id)?.ok_or(TxError::Rejected(Rejection::AccountNotFound))
}

/// Read two distinct accounts for update, returned as `(first, second)`
///
/// Reads happen in ascending id order whatever the caller's roles are.
pub(crate) fn lock_pair(conn: &mut SqliteConnection, first: &str, second: &str) -> Result<(Account, Account), TxError> {
    let mut loaded = accounts::load_in_lock_order(conn, &[first, second])?;
    let second_pos = loaded.iter().position(|a| a.id == second);
    let first_pos = loaded.iter().position(|a| a.id == first);

    match (first_pos, second_pos) {
        (Some(f), Some(s)) if f != s => {
            // Remove the higher index first so the lower one stays valid
            if f > s {
                let a = loaded.swap_remove(f);
                let b = loaded.swap_remove(s);
                Ok((a, b))
            } else {
                let b = loaded.swap_remove(s);
                let a = loaded.swap_remove(f);
                Ok((a, b))
            }
        }
        _ => Err(TxError::Rejected(Rejection::AccountNotFound)),
    }
}

// ============================================================================
// Balance mutation
// ============================================================================

/// Signed change to an account's totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Grant {
    pub currency: i64,
    pub experience: i64,
}

/// Apply `grant` to `account` and verify the stored result
///
/// A grant that would take the balance below zero is rejected before
/// anything is written. The level is recomputed from total experience.
/// If the row no longer holds what was read, or does not hold what was
/// written, the operation fails with `BalanceVerification`.
pub(crate) fn apply_grant(
    conn: &mut SqliteConnection,
    account: &Account,
    grant: Grant,
    curve: &LevelCurve,
) -> Result<Account, TxError> {
    if grant.experience < 0 {
        return Err(LedgerError::Internal(format!(
            "experience is cumulative, refusing delta {} for {}",
            grant.experience, account.id
        ))
        .into());
    }

    let expected_balance = account
        .balance
        .checked_add(grant.currency)
        .ok_or_else(|| LedgerError::Internal(format!("balance overflow for {}", account.id)))?;
    if expected_balance < 0 {
        return Err(Rejection::InsufficientFunds {
            required: -grant.currency,
            available: account.balance,
        }
        .into());
    }

    let expected_experience = account
        .experience
        .checked_add(grant.experience)
        .ok_or_else(|| LedgerError::Internal(format!("experience overflow for {}", account.id)))?;
    let expected_level = curve.level_for(expected_experience);

    let changed = accounts::update_totals(conn, account, expected_balance, expected_experience, expected_level)?;

    let stored = accounts::find(conn, &account.id)?
        .ok_or_else(|| LedgerError::Internal(format!("account {} vanished during update", account.id)))?;

    if changed != 1
        || stored.balance != expected_balance
        || stored.experience != expected_experience
        || stored.level != expected_level
    {
        warn!(
            account_id = %account.id,
            rows = changed,
            expected_balance,
            actual_balance = stored.balance,
            expected_experience,
            actual_experience = stored.experience,
            "Balance verification failed"
        );
        return Err(LedgerError::BalanceVerification {
            account_id: account.id.clone(),
            expected_balance,
            actual_balance: stored.balance,
            expected_experience,
            actual_experience: stored.experience,
        }
        .into());
    }

    Ok(stored)
}

// ============================================================================
// Ledger entries
// ============================================================================

/// Ledger entry to write once the mutation is verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntryDraft {
    pub cause: &'static str,
    pub amount: i64,
    pub counterparty_id: Option<String>,
    pub description: String,
    pub reference: String,
}

/// Append drafts for `account_id`, skipping zero amounts
pub(crate) fn append_entries(
    conn: &mut SqliteConnection,
    account_id: &str,
    drafts: &[EntryDraft],
    now: &str,
) -> Result<Vec<LedgerEntry>, TxError> {
    let mut written = Vec::with_capacity(drafts.len());
    for draft in drafts.iter().filter(|d| d.amount != 0) {
        let entry = ledger::append(
            conn,
            &NewLedgerEntry {
                account_id,
                cause: draft.cause,
                amount: draft.amount,
                counterparty_id: draft.counterparty_id.as_deref(),
                description: &draft.description,
                reference: &draft.reference,
                created_at: now,
            },
        )?;
        written.push(entry);
    }
    Ok(written)
}

// ============================================================================
// Single-account reward template
// ============================================================================

/// Idempotency key of a claimable reward
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClaimKey {
    pub kind: &'static str,
    pub key: String,
}

/// What a reward action will do to the locked account
#[derive(Debug, Clone, Default)]
pub(crate) struct RewardPlan {
    pub grant: Grant,
    pub streak_position: Option<i32>,
    pub entries: Vec<EntryDraft>,
}

/// A single-account reward run by [`execute_reward`]
pub(crate) trait RewardAction {
    /// Name used in logs
    const OPERATION: &'static str;

    fn account_id(&self) -> &str;

    /// `None` for actions that may repeat, like purchases
    fn claim_key(&self) -> Option<ClaimKey>;

    /// Preconditions checked before the claim guard
    fn gate(&self, _account: &Account) -> Result<(), Rejection> {
        Ok(())
    }

    fn plan(&self, conn: &mut SqliteConnection, account: &Account) -> Result<RewardPlan, TxError>;
}

/// Everything an applied reward changed
#[derive(Debug, Clone)]
pub(crate) struct RewardApplied {
    pub before: Account,
    pub after: Account,
    pub plan: RewardPlan,
    pub claim: Option<ClaimRecord>,
}

/// Run `action` through the lock, guard, apply, verify, persist sequence
pub(crate) fn execute_reward<A: RewardAction>(
    db: &LedgerDb,
    curve: &LevelCurve,
    action: &A,
) -> Result<Outcome<RewardApplied>, LedgerError> {
    run_atomic(db, A::OPERATION, |conn| {
        let before = lock_account(conn, action.account_id())?;
        action.gate(&before)?;

        let claim_key = action.claim_key();
        if let Some(key) = &claim_key {
            if claims::exists(conn, &before.id, key.kind, &key.key)? {
                return Err(Rejection::AlreadyClaimed.into());
            }
        }

        let plan = action.plan(conn, &before)?;
        let after = apply_grant(conn, &before, plan.grant, curve)?;
        let now = current_timestamp();

        let claim = match &claim_key {
            Some(key) => {
                let attempt = claims::try_claim(
                    conn,
                    &NewClaimRecord {
                        account_id: &before.id,
                        claim_kind: key.kind,
                        claim_key: &key.key,
                        currency_granted: plan.grant.currency,
                        experience_granted: plan.grant.experience,
                        streak_position: plan.streak_position,
                        claimed_at: &now,
                    },
                )?;
                match attempt {
                    ClaimAttempt::Claimed(record) => Some(record),
                    ClaimAttempt::AlreadyClaimed => return Err(Rejection::AlreadyClaimed.into()),
                }
            }
            None => None,
        };

        append_entries(conn, &before.id, &plan.entries, &now)?;

        Ok(RewardApplied {
            before,
            after,
            plan,
            claim,
        })
    })
}
