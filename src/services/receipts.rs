//! Structured results returned by the economy services

use serde::Serialize;

use super::policy::{DailyReward, PurchaseKind};
use crate::db::ledger::CauseTotal;
use crate::db::{ClaimRecord, Page};

/// Result of a daily claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyClaimReceipt {
    pub account_id: String,
    pub claim_date: String,
    pub granted_currency: i64,
    pub granted_experience: i64,
    pub new_balance: i64,
    pub new_experience: i64,
    pub new_level: i32,
    pub streak_position: i32,
    pub cycle_completed: bool,
    pub leveled_up: bool,
}

/// One day of the 7-day schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleDay {
    pub day: i32,
    pub currency: i64,
    pub experience: i64,
    pub claimed: bool,
    pub is_today: bool,
    pub can_claim: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyClaimStatus {
    pub account_id: String,
    pub today: String,
    pub claimed_today: bool,
    pub current_streak: i32,
    /// Position the next claim will take
    pub next_streak_position: i32,
    pub next_reward: DailyReward,
    pub schedule: Vec<ScheduleDay>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyClaimHistory {
    pub claims: Page<ClaimRecord>,
    pub total_currency_earned: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BattlePassReceipt {
    pub account_id: String,
    pub tier: i32,
    pub granted_currency: i64,
    pub new_balance: i64,
    pub new_level: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BattlePassProgress {
    pub account_id: String,
    pub level: i32,
    pub claimed_tiers: Vec<i32>,
    pub claimable_tiers: Vec<i32>,
    pub total_currency_earned: i64,
}

/// Result of applying a referral code at registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferralReceipt {
    pub bonus_granted: bool,
    pub referrer_account_id: String,
    pub referee_account_id: String,
    pub referrer_currency: i64,
    pub referrer_experience: i64,
    pub referee_currency: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub account_id: String,
    pub item_id: String,
    pub kind: PurchaseKind,
    pub price: i64,
    pub new_balance: i64,
    pub new_experience: i64,
    pub new_level: i32,
    pub cashback_experience: i64,
    pub leveled_up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    /// Id of the sender's ledger entry
    pub transfer_record_id: i64,
    /// Shared by both sides' ledger entries
    pub reference: String,
    pub amount: i64,
    pub recipient_account_id: String,
    pub new_sender_balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletStats {
    pub account_id: String,
    pub balance: i64,
    pub experience: i64,
    pub level: i32,
    pub total_earned: i64,
    pub total_spent: i64,
    pub referral_count: i64,
    pub by_cause: Vec<CauseTotal>,
}

/// Drift between stored totals and what the ledger implies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub account_id: String,
    pub balance: i64,
    pub ledger_total: i64,
    /// `balance - ledger_total`
    pub balance_drift: i64,
    pub experience: i64,
    pub stored_level: i32,
    pub derived_level: i32,
    pub consistent: bool,
}
