//! Diesel model definitions for the ledger tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::*;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Get current UTC timestamp as ISO 8601 string for SQLite TEXT columns
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Account Models
// ============================================================================

/// Balance store row
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = accounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Account {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub wallet_address: String,
    pub referral_code: String,
    pub balance: i64,
    pub experience: i64,
    pub level: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// New account for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = accounts)]
pub struct NewAccount<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub email: Option<&'a str>,
    pub wallet_address: &'a str,
    pub referral_code: &'a str,
    pub balance: i64,
    pub experience: i64,
    pub level: i32,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Claim Ledger Models
// ============================================================================

/// Granted claim, immutable once written
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = claim_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ClaimRecord {
    pub id: i64,
    pub account_id: String,
    pub claim_kind: String,
    pub claim_key: String,
    pub currency_granted: i64,
    pub experience_granted: i64,
    pub streak_position: Option<i32>,
    pub claimed_at: String,
}

/// New claim for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = claim_records)]
pub struct NewClaimRecord<'a> {
    pub account_id: &'a str,
    pub claim_kind: &'a str,
    pub claim_key: &'a str,
    pub currency_granted: i64,
    pub experience_granted: i64,
    pub streak_position: Option<i32>,
    pub claimed_at: &'a str,
}

/// Claim kinds (the namespace of a claim key)
pub mod claim_kinds {
    /// Keyed by calendar date `YYYY-MM-DD`
    pub const DAILY: &str = "daily";
    /// Keyed by tier number
    pub const BATTLE_PASS: &str = "battle_pass";

    pub const ALL: [&str; 2] = [DAILY, BATTLE_PASS];

    pub fn is_valid(kind: &str) -> bool {
        ALL.contains(&kind)
    }
}

// ============================================================================
// Transaction Log Models
// ============================================================================

/// Audit record of one signed currency delta
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = ledger_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LedgerEntry {
    pub id: i64,
    pub account_id: String,
    pub cause: String,
    pub amount: i64,
    pub counterparty_id: Option<String>,
    pub description: String,
    pub reference: String,
    pub created_at: String,
}

/// New ledger entry for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ledger_entries)]
pub struct NewLedgerEntry<'a> {
    pub account_id: &'a str,
    pub cause: &'a str,
    pub amount: i64,
    pub counterparty_id: Option<&'a str>,
    pub description: &'a str,
    pub reference: &'a str,
    pub created_at: &'a str,
}

/// Cause tags for ledger entries
pub mod entry_causes {
    pub const STARTING_BONUS: &str = "starting_bonus";
    pub const DAILY_CLAIM: &str = "daily_claim";
    pub const REFERRAL_BONUS: &str = "referral_bonus";
    pub const TRANSFER_SENT: &str = "transfer_sent";
    pub const TRANSFER_RECEIVED: &str = "transfer_received";
    pub const PURCHASE: &str = "purchase";
    pub const BATTLE_PASS_REWARD: &str = "battle_pass_reward";
    pub const CARD_PURCHASE: &str = "card_purchase";

    /// All supported cause tags
    pub const ALL: [&str; 8] = [
        STARTING_BONUS,
        DAILY_CLAIM,
        REFERRAL_BONUS,
        TRANSFER_SENT,
        TRANSFER_RECEIVED,
        PURCHASE,
        BATTLE_PASS_REWARD,
        CARD_PURCHASE,
    ];

    pub fn is_valid(cause: &str) -> bool {
        ALL.contains(&cause)
    }
}

// ============================================================================
// Referral Models
// ============================================================================

/// Inbound referral of one account
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = referral_links)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReferralLink {
    pub referee_id: String,
    pub referrer_id: String,
    pub code_used: String,
    pub bonus_granted: bool,
    pub created_at: String,
}

/// New referral link for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = referral_links)]
pub struct NewReferralLink<'a> {
    pub referee_id: &'a str,
    pub referrer_id: &'a str,
    pub code_used: &'a str,
    pub bonus_granted: bool,
    pub created_at: &'a str,
}
