//! Referral link operations

use diesel::prelude::*;

use super::diesel_schema::referral_links;
use super::is_unique_violation;
use super::models::{NewReferralLink, ReferralLink};
use crate::error::LedgerError;

/// Get the inbound referral of an account, if any
pub fn find_by_referee(conn: &mut SqliteConnection, referee_id: &str) -> Result<Option<ReferralLink>, LedgerError> {
    referral_links::table
        .find(referee_id)
        .select(ReferralLink::as_select())
        .first(conn)
        .optional()
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

/// Number of accounts this account has referred
pub fn count_by_referrer(conn: &mut SqliteConnection, referrer_id: &str) -> Result<i64, LedgerError> {
    referral_links::table
        .filter(referral_links::referrer_id.eq(referrer_id))
        .count()
        .get_result(conn)
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

/// Record a referral link
///
/// Returns `false` when the referee already has one.
pub fn insert(conn: &mut SqliteConnection, link: &NewReferralLink<'_>) -> Result<bool, LedgerError> {
    match diesel::insert_into(referral_links::table)
        .values(link)
        .execute(conn)
    {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(LedgerError::Database(format!("Insert failed: {}", e))),
    }
}
