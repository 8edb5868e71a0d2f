//! History service - transaction log reads, wallet stats and reconciliation

use std::sync::Arc;

use tracing::warn;

use crate::db::models::entry_causes;
use crate::db::{accounts, ledger, referrals, LedgerDb, LedgerEntry, Page, PageRequest};
use crate::error::LedgerError;
use crate::progression::LevelCurve;

use super::outcome::{Outcome, Rejection};
use super::receipts::{Reconciliation, WalletStats};

pub struct HistoryService {
    db: Arc<LedgerDb>,
    curve: LevelCurve,
}

impl HistoryService {
    pub fn new(db: Arc<LedgerDb>, curve: LevelCurve) -> Self {
        Self { db, curve }
    }

    /// Ledger entries, newest first, optionally filtered by cause tag
    pub fn get_balance_history(
        &self,
        account_id: &str,
        request: PageRequest,
        cause: Option<&str>,
    ) -> Result<Outcome<Page<LedgerEntry>>, LedgerError> {
        let request = request.normalized();
        self.db.with_conn(|conn| {
            if accounts::find(conn, account_id)?.is_none() {
                return Ok(Outcome::Rejected(Rejection::AccountNotFound));
            }
            // No entry can carry an unknown cause tag
            if cause.is_some_and(|c| !entry_causes::is_valid(c)) {
                return Ok(Outcome::Applied(Page::new(Vec::new(), request, 0)));
            }
            let items = ledger::list(conn, account_id, cause, request)?;
            let total = ledger::count(conn, account_id, cause)?;
            Ok(Outcome::Applied(Page::new(items, request, total)))
        })
    }

    pub fn wallet_stats(&self, account_id: &str) -> Result<Outcome<WalletStats>, LedgerError> {
        self.db.with_conn(|conn| {
            let account = match accounts::find(conn, account_id)? {
                Some(account) => account,
                None => return Ok(Outcome::Rejected(Rejection::AccountNotFound)),
            };

            let rows = ledger::load_amounts(conn, account_id)?;
            let total_earned: i64 = rows.iter().map(|(_, a)| *a).filter(|a| *a > 0).sum();
            let total_spent: i64 = rows.iter().map(|(_, a)| *a).filter(|a| *a < 0).map(|a| -a).sum();
            let referral_count = referrals::count_by_referrer(conn, account_id)?;

            Ok(Outcome::Applied(WalletStats {
                account_id: account.id,
                balance: account.balance,
                experience: account.experience,
                level: account.level,
                total_earned,
                total_spent,
                referral_count,
                by_cause: ledger::group_by_cause(rows),
            }))
        })
    }

    /// Compare stored totals with the ledger and the level curve
    ///
    /// Read-only; drift is reported, never repaired here.
    pub fn reconcile_account(&self, account_id: &str) -> Result<Outcome<Reconciliation>, LedgerError> {
        self.db.with_conn(|conn| {
            let account = match accounts::find(conn, account_id)? {
                Some(account) => account,
                None => return Ok(Outcome::Rejected(Rejection::AccountNotFound)),
            };

            let ledger_total = ledger::net_total(conn, account_id)?;
            let derived_level = self.curve.level_for(account.experience);
            let balance_drift = account.balance - ledger_total;
            let consistent = balance_drift == 0 && derived_level == account.level;

            if !consistent {
                warn!(
                    account_id = %account.id,
                    balance = account.balance,
                    ledger_total,
                    stored_level = account.level,
                    derived_level,
                    "Account drifted from its ledger"
                );
            }

            Ok(Outcome::Applied(Reconciliation {
                account_id: account.id,
                balance: account.balance,
                ledger_total,
                balance_drift,
                experience: account.experience,
                stored_level: account.level,
                derived_level,
                consistent,
            }))
        })
    }
}
