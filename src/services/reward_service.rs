//! Reward service - daily claims, battle pass, referrals and purchases
//!
//! Each mutating operation is a [`RewardAction`] run through the shared
//! atomic template, except referrals, which touch two accounts.

use std::sync::Arc;

use chrono::NaiveDate;
use diesel::prelude::*;
use tracing::info;

use crate::db::models::{claim_kinds, current_timestamp, entry_causes, NewReferralLink};
use crate::db::{accounts, claims, ledger, referrals, Account, LedgerDb, Page, PageRequest};
use crate::error::LedgerError;
use crate::progression::LevelCurve;

use super::atomic::{
    append_entries, apply_grant, execute_reward, lock_pair, run_atomic, ClaimKey, EntryDraft, Grant, RewardAction,
    RewardPlan, TxError,
};
use super::clock::{Clock, SystemClock};
use super::events::{EventBus, LedgerEvent};
use super::outcome::{Outcome, Rejection};
use super::policy::{PurchaseKind, RewardPolicy};
use super::receipts::{
    BattlePassProgress, BattlePassReceipt, DailyClaimHistory, DailyClaimReceipt, DailyClaimStatus, PurchaseReceipt,
    ReferralReceipt, ScheduleDay,
};
use super::streak::{self, CYCLE_LENGTH};

// ============================================================================
// Reward actions
// ============================================================================

struct DailyClaim<'a> {
    account_id: &'a str,
    today: NaiveDate,
    policy: &'a RewardPolicy,
}

impl RewardAction for DailyClaim<'_> {
    const OPERATION: &'static str = "claim_daily_reward";

    fn account_id(&self) -> &str {
        self.account_id
    }

    fn claim_key(&self) -> Option<ClaimKey> {
        Some(ClaimKey {
            kind: claim_kinds::DAILY,
            key: streak::claim_key(self.today),
        })
    }

    fn plan(&self, conn: &mut SqliteConnection, account: &Account) -> Result<RewardPlan, TxError> {
        let prior = latest_daily_position(conn, &account.id)?;
        let position = streak::next_streak(self.today, prior);
        let reward = self.policy.daily_reward(position);

        Ok(RewardPlan {
            grant: Grant {
                currency: reward.currency,
                experience: reward.experience,
            },
            streak_position: Some(position),
            entries: vec![EntryDraft {
                cause: entry_causes::DAILY_CLAIM,
                amount: reward.currency,
                counterparty_id: None,
                description: format!("Daily claim reward - Day {} ({} pearls)", position, reward.currency),
                reference: format!("CLAIM-{}-{}", self.today.format("%Y%m%d"), account.id),
            }],
        })
    }
}

struct BattlePassClaim<'a> {
    account_id: &'a str,
    tier: i32,
    policy: &'a RewardPolicy,
    curve: &'a LevelCurve,
}

impl RewardAction for BattlePassClaim<'_> {
    const OPERATION: &'static str = "claim_battle_pass_tier";

    fn account_id(&self) -> &str {
        self.account_id
    }

    fn claim_key(&self) -> Option<ClaimKey> {
        Some(ClaimKey {
            kind: claim_kinds::BATTLE_PASS,
            key: self.tier.to_string(),
        })
    }

    fn gate(&self, account: &Account) -> Result<(), Rejection> {
        if self.tier < 1 || self.tier > self.policy.max_level {
            return Err(Rejection::InvalidTier);
        }
        // The cached level may be stale; experience decides
        let level = self.curve.level_for(account.experience);
        if level < self.tier {
            return Err(Rejection::InsufficientLevel {
                required: self.tier,
                current: level,
            });
        }
        Ok(())
    }

    fn plan(&self, _conn: &mut SqliteConnection, account: &Account) -> Result<RewardPlan, TxError> {
        let currency = self.policy.battle_pass_currency(self.tier);

        // Battle pass rewards carry no experience
        Ok(RewardPlan {
            grant: Grant { currency, experience: 0 },
            streak_position: None,
            entries: vec![EntryDraft {
                cause: entry_causes::BATTLE_PASS_REWARD,
                amount: currency,
                counterparty_id: None,
                description: format!("Battle pass level {} reward ({} pearls)", self.tier, currency),
                reference: format!("BP-{}-{}", self.tier, account.id),
            }],
        })
    }
}

struct Purchase<'a> {
    account_id: &'a str,
    item_id: &'a str,
    price: i64,
    kind: PurchaseKind,
    policy: &'a RewardPolicy,
}

impl RewardAction for Purchase<'_> {
    const OPERATION: &'static str = "purchase_item";

    fn account_id(&self) -> &str {
        self.account_id
    }

    fn claim_key(&self) -> Option<ClaimKey> {
        None
    }

    fn gate(&self, account: &Account) -> Result<(), Rejection> {
        if self.price <= 0 {
            return Err(Rejection::InvalidAmount);
        }
        if account.balance < self.price {
            return Err(Rejection::InsufficientFunds {
                required: self.price,
                available: account.balance,
            });
        }
        Ok(())
    }

    fn plan(&self, _conn: &mut SqliteConnection, _account: &Account) -> Result<RewardPlan, TxError> {
        let cashback = self.policy.cashback_experience(self.kind, self.price);

        Ok(RewardPlan {
            grant: Grant {
                currency: -self.price,
                experience: cashback,
            },
            streak_position: None,
            entries: vec![EntryDraft {
                cause: self.kind.cause(),
                amount: -self.price,
                counterparty_id: None,
                description: format!("Purchased {} for {} pearls", self.item_id, self.price),
                reference: format!("{}-{}", self.kind.reference_prefix(), self.item_id),
            }],
        })
    }
}

/// Date and position of the most recent daily claim
fn latest_daily_position(
    conn: &mut SqliteConnection,
    account_id: &str,
) -> Result<Option<(NaiveDate, i32)>, LedgerError> {
    Ok(claims::latest_daily(conn, account_id)?.and_then(|record| {
        streak::parse_claim_key(&record.claim_key).map(|date| (date, record.streak_position.unwrap_or(1)))
    }))
}

/// A referral only belongs to a newly registered account
///
/// The referee must not predate the referrer, must have done nothing since
/// its starting bonus, and must not be the one who referred the referrer.
fn ensure_referral_eligible(conn: &mut SqliteConnection, referee: &Account, referrer: &Account) -> Result<(), TxError> {
    if referee.created_at < referrer.created_at {
        return Err(Rejection::ReferralNotEligible.into());
    }
    if ledger::has_activity_besides(conn, &referee.id, entry_causes::STARTING_BONUS)? {
        return Err(Rejection::ReferralNotEligible.into());
    }
    let referrer_link = referrals::find_by_referee(conn, &referrer.id)?;
    if referrer_link.is_some_and(|link| link.referrer_id == referee.id) {
        return Err(Rejection::ReferralNotEligible.into());
    }
    Ok(())
}

/// Status of the 7-day cycle as seen on `today`
fn build_status(policy: &RewardPolicy, account_id: &str, today: NaiveDate, prior: Option<(NaiveDate, i32)>) -> DailyClaimStatus {
    let claimed_today = matches!(prior, Some((date, _)) if date == today);
    let current_streak = streak::current_streak(today, prior);
    let next_streak_position = if claimed_today {
        today
            .succ_opt()
            .map(|tomorrow| streak::next_streak(tomorrow, prior))
            .unwrap_or(1)
    } else {
        streak::next_streak(today, prior)
    };

    let schedule = (1..=CYCLE_LENGTH)
        .map(|day| {
            let reward = policy.daily_reward(day);
            let (claimed, is_today) = if claimed_today {
                (day <= current_streak, day == current_streak)
            } else {
                (day < next_streak_position, day == next_streak_position)
            };
            ScheduleDay {
                day,
                currency: reward.currency,
                experience: reward.experience,
                claimed,
                is_today,
                can_claim: !claimed_today && day == next_streak_position,
            }
        })
        .collect();

    DailyClaimStatus {
        account_id: account_id.to_string(),
        today: streak::claim_key(today),
        claimed_today,
        current_streak,
        next_streak_position,
        next_reward: policy.daily_reward(next_streak_position),
        schedule,
    }
}

// ============================================================================
// Service
// ============================================================================

/// Reward service for claims, referrals and purchases
pub struct RewardService {
    db: Arc<LedgerDb>,
    events: Arc<EventBus>,
    policy: Arc<RewardPolicy>,
    curve: LevelCurve,
    clock: Arc<dyn Clock>,
}

impl RewardService {
    pub fn new(db: Arc<LedgerDb>, events: Arc<EventBus>, policy: Arc<RewardPolicy>) -> Self {
        let curve = policy.level_curve();
        Self {
            db,
            events,
            policy,
            curve,
            clock: Arc::new(SystemClock),
        }
    }

    /// Date daily claims by `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn emit_level_change(&self, before: &Account, after: &Account) {
        if let Some(event) = LedgerEvent::level_change(before, after) {
            self.events.emit(event);
        }
    }

    // =========================================================================
    // Daily claims
    // =========================================================================

    /// Claim today's daily reward, today being the service clock's UTC day
    pub fn claim_daily_reward(&self, account_id: &str) -> Result<Outcome<DailyClaimReceipt>, LedgerError> {
        let today = self.clock.today();
        let action = DailyClaim {
            account_id,
            today,
            policy: &self.policy,
        };

        let outcome = execute_reward(&self.db, &self.curve, &action)?;
        Ok(outcome.map(|applied| {
            let streak_position = applied.plan.streak_position.unwrap_or(1);
            let grant = applied.plan.grant;

            info!(
                account_id = %applied.after.id,
                streak = streak_position,
                currency = grant.currency,
                experience = grant.experience,
                balance = applied.after.balance,
                "Daily reward claimed"
            );
            self.events.emit(LedgerEvent::DailyClaimed {
                account_id: applied.after.id.clone(),
                streak_position,
                currency: grant.currency,
                experience: grant.experience,
            });
            self.emit_level_change(&applied.before, &applied.after);

            DailyClaimReceipt {
                account_id: applied.after.id.clone(),
                claim_date: streak::claim_key(today),
                granted_currency: grant.currency,
                granted_experience: grant.experience,
                new_balance: applied.after.balance,
                new_experience: applied.after.experience,
                new_level: applied.after.level,
                streak_position,
                cycle_completed: streak_position == CYCLE_LENGTH,
                leveled_up: applied.after.level > applied.before.level,
            }
        }))
    }

    pub fn daily_claim_status(&self, account_id: &str) -> Result<Outcome<DailyClaimStatus>, LedgerError> {
        self.daily_claim_status_on(account_id, self.clock.today())
    }

    /// Status as it would look on `today`; read-only
    pub fn daily_claim_status_on(
        &self,
        account_id: &str,
        today: NaiveDate,
    ) -> Result<Outcome<DailyClaimStatus>, LedgerError> {
        self.db.with_conn(|conn| {
            if accounts::find(conn, account_id)?.is_none() {
                return Ok(Outcome::Rejected(Rejection::AccountNotFound));
            }
            let prior = latest_daily_position(conn, account_id)?;
            Ok(Outcome::Applied(build_status(&self.policy, account_id, today, prior)))
        })
    }

    /// Daily claims, newest first, with the currency they earned in total
    pub fn daily_claim_history(
        &self,
        account_id: &str,
        request: PageRequest,
    ) -> Result<Outcome<DailyClaimHistory>, LedgerError> {
        let request = request.normalized();
        self.db.with_conn(|conn| {
            if accounts::find(conn, account_id)?.is_none() {
                return Ok(Outcome::Rejected(Rejection::AccountNotFound));
            }
            let items = claims::list(conn, account_id, claim_kinds::DAILY, request)?;
            let total = claims::count(conn, account_id, claim_kinds::DAILY)?;
            let total_currency_earned = claims::currency_total(conn, account_id, claim_kinds::DAILY)?;

            Ok(Outcome::Applied(DailyClaimHistory {
                claims: Page::new(items, request, total),
                total_currency_earned,
            }))
        })
    }

    // =========================================================================
    // Battle pass
    // =========================================================================

    /// Claim the reward of one battle pass tier (requires level >= tier)
    pub fn claim_battle_pass_tier(&self, account_id: &str, tier: i32) -> Result<Outcome<BattlePassReceipt>, LedgerError> {
        let action = BattlePassClaim {
            account_id,
            tier,
            policy: &self.policy,
            curve: &self.curve,
        };

        let outcome = execute_reward(&self.db, &self.curve, &action)?;
        Ok(outcome.map(|applied| {
            let currency = applied.plan.grant.currency;
            info!(account_id = %applied.after.id, tier, currency, "Battle pass tier claimed");
            self.events.emit(LedgerEvent::BattlePassClaimed {
                account_id: applied.after.id.clone(),
                tier,
                currency,
            });

            BattlePassReceipt {
                account_id: applied.after.id.clone(),
                tier,
                granted_currency: currency,
                new_balance: applied.after.balance,
                new_level: applied.after.level,
            }
        }))
    }

    pub fn battle_pass_progress(&self, account_id: &str) -> Result<Outcome<BattlePassProgress>, LedgerError> {
        self.db.with_conn(|conn| {
            let account = match accounts::find(conn, account_id)? {
                Some(account) => account,
                None => return Ok(Outcome::Rejected(Rejection::AccountNotFound)),
            };

            let mut claimed_tiers: Vec<i32> = claims::claimed_keys(conn, account_id, claim_kinds::BATTLE_PASS)?
                .iter()
                .filter_map(|key| key.parse().ok())
                .collect();
            claimed_tiers.sort_unstable();

            let level = self.curve.level_for(account.experience);
            let claimable_tiers = (1..=level.min(self.policy.max_level))
                .filter(|tier| claimed_tiers.binary_search(tier).is_err())
                .collect();
            let total_currency_earned = claims::currency_total(conn, account_id, claim_kinds::BATTLE_PASS)?;

            Ok(Outcome::Applied(BattlePassProgress {
                account_id: account.id,
                level,
                claimed_tiers,
                claimable_tiers,
                total_currency_earned,
            }))
        })
    }

    // =========================================================================
    // Referrals
    // =========================================================================

    /// Apply a referral code for a freshly opened account
    ///
    /// Referrer gets currency and experience, referee gets currency only.
    pub fn register_with_referral(
        &self,
        new_account_id: &str,
        referral_code: &str,
    ) -> Result<Outcome<ReferralReceipt>, LedgerError> {
        let code = referral_code.trim().to_uppercase();
        if code.is_empty() {
            return Ok(Outcome::Rejected(Rejection::InvalidReferralCode));
        }
        let policy = &self.policy;

        let outcome = run_atomic(&self.db, "register_with_referral", |conn| {
            let referrer = accounts::find_by_referral_code(conn, &code)?.ok_or(Rejection::InvalidReferralCode)?;
            if referrer.id == new_account_id {
                return Err(Rejection::SelfReferral.into());
            }

            let (referee, referrer) = lock_pair(conn, new_account_id, &referrer.id)?;
            if referrals::find_by_referee(conn, &referee.id)?.is_some() {
                return Err(Rejection::AlreadyReferred.into());
            }
            ensure_referral_eligible(conn, &referee, &referrer)?;

            let referrer_after = apply_grant(
                conn,
                &referrer,
                Grant {
                    currency: policy.referrer_currency,
                    experience: policy.referrer_experience,
                },
                &self.curve,
            )?;
            apply_grant(
                conn,
                &referee,
                Grant {
                    currency: policy.referee_currency,
                    experience: 0,
                },
                &self.curve,
            )?;

            let now = current_timestamp();
            let linked = referrals::insert(
                conn,
                &NewReferralLink {
                    referee_id: &referee.id,
                    referrer_id: &referrer.id,
                    code_used: &code,
                    bonus_granted: true,
                    created_at: &now,
                },
            )?;
            if !linked {
                return Err(Rejection::AlreadyReferred.into());
            }

            let reference = format!("REF-{}", referee.id);
            append_entries(
                conn,
                &referrer.id,
                &[EntryDraft {
                    cause: entry_causes::REFERRAL_BONUS,
                    amount: policy.referrer_currency,
                    counterparty_id: Some(referee.id.clone()),
                    description: format!("Referral bonus for inviting {}", referee.username),
                    reference: reference.clone(),
                }],
                &now,
            )?;
            append_entries(
                conn,
                &referee.id,
                &[EntryDraft {
                    cause: entry_causes::REFERRAL_BONUS,
                    amount: policy.referee_currency,
                    counterparty_id: Some(referrer.id.clone()),
                    description: format!("Welcome bonus for joining with code {}", code),
                    reference,
                }],
                &now,
            )?;

            Ok((referrer, referrer_after, referee.id))
        })?;

        Ok(outcome.map(|(referrer, referrer_after, referee_id)| {
            info!(
                referrer_id = %referrer.id,
                referee_id = %referee_id,
                code = %code,
                "Referral applied"
            );
            self.events.emit(LedgerEvent::ReferralApplied {
                referrer_id: referrer.id.clone(),
                referee_id: referee_id.clone(),
            });
            self.emit_level_change(&referrer, &referrer_after);

            ReferralReceipt {
                bonus_granted: true,
                referrer_account_id: referrer.id,
                referee_account_id: referee_id,
                referrer_currency: policy.referrer_currency,
                referrer_experience: policy.referrer_experience,
                referee_currency: policy.referee_currency,
            }
        }))
    }

    // =========================================================================
    // Purchases
    // =========================================================================

    /// Buy a cosmetic item: debit the price, credit cashback experience
    pub fn purchase_item(&self, account_id: &str, item_id: &str, price: i64) -> Result<Outcome<PurchaseReceipt>, LedgerError> {
        self.purchase(account_id, item_id, price, PurchaseKind::AvatarItem)
    }

    /// Buy a marketplace card
    pub fn purchase_card(&self, account_id: &str, card_id: &str, price: i64) -> Result<Outcome<PurchaseReceipt>, LedgerError> {
        self.purchase(account_id, card_id, price, PurchaseKind::Card)
    }

    pub fn purchase(
        &self,
        account_id: &str,
        item_id: &str,
        price: i64,
        kind: PurchaseKind,
    ) -> Result<Outcome<PurchaseReceipt>, LedgerError> {
        let item_id = item_id.trim();
        let action = Purchase {
            account_id,
            item_id,
            price,
            kind,
            policy: &self.policy,
        };

        let outcome = execute_reward(&self.db, &self.curve, &action)?;
        Ok(outcome.map(|applied| {
            let cashback = applied.plan.grant.experience;
            info!(
                account_id = %applied.after.id,
                item_id = %item_id,
                price,
                cashback,
                balance = applied.after.balance,
                "Purchase completed"
            );
            self.events.emit(LedgerEvent::PurchaseCompleted {
                account_id: applied.after.id.clone(),
                item_id: item_id.to_string(),
                price,
                cashback_experience: cashback,
            });
            self.emit_level_change(&applied.before, &applied.after);

            PurchaseReceipt {
                account_id: applied.after.id.clone(),
                item_id: item_id.to_string(),
                kind,
                price,
                new_balance: applied.after.balance,
                new_experience: applied.after.experience,
                new_level: applied.after.level,
                cashback_experience: cashback,
                leveled_up: applied.after.level > applied.before.level,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::diesel_schema;
    use crate::services::account_service::AccountService;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixture {
        db: Arc<LedgerDb>,
        accounts: AccountService,
        rewards: RewardService,
        /// Day of March 2026 the reward clock reports
        today: Arc<AtomicU32>,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(LedgerDb::open_in_memory().unwrap());
        let events = Arc::new(EventBus::new());
        let policy = Arc::new(RewardPolicy::default());
        let today = Arc::new(AtomicU32::new(1));
        let clock = {
            let today = today.clone();
            move || day(today.load(Ordering::SeqCst))
        };
        Fixture {
            accounts: AccountService::new(db.clone(), events.clone(), policy.clone()),
            rewards: RewardService::new(db.clone(), events, policy).with_clock(Arc::new(clock)),
            db,
            today,
        }
    }

    /// Claim the daily reward with the clock set to `d`
    fn claim_on(f: &Fixture, id: &str, d: u32) -> Outcome<DailyClaimReceipt> {
        f.today.store(d, Ordering::SeqCst);
        f.rewards.claim_daily_reward(id).unwrap()
    }

    fn open(f: &Fixture, username: &str) -> Account {
        f.accounts.open_account(username, None).unwrap().applied().unwrap()
    }

    fn reload(f: &Fixture, id: &str) -> Account {
        f.accounts.get(id).unwrap().unwrap()
    }

    fn set_experience(f: &Fixture, id: &str, experience: i64) {
        let mut conn = f.db.conn().unwrap();
        let account = accounts::find(&mut conn, id).unwrap().unwrap();
        let level = LevelCurve::default().level_for(experience);
        accounts::update_totals(&mut conn, &account, account.balance, experience, level).unwrap();
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_daily_streak_scenario() {
        let f = fixture();
        let account = open(&f, "alice");

        let first = claim_on(&f, &account.id, 1).applied().unwrap();
        assert_eq!(first.streak_position, 1);
        assert_eq!(first.granted_currency, 500);
        assert_eq!(first.new_balance, 1500);

        let second = claim_on(&f, &account.id, 2).applied().unwrap();
        assert_eq!(second.streak_position, 2);
        assert_eq!(second.granted_currency, 750);

        // Gap of several days resets
        let after_gap = claim_on(&f, &account.id, 6).applied().unwrap();
        assert_eq!(after_gap.streak_position, 1);
        assert_eq!(after_gap.new_balance, 1000 + 500 + 750 + 500);
    }

    #[test]
    fn test_daily_cycle_completes_and_wraps() {
        let f = fixture();
        let account = open(&f, "alice");

        let mut last = None;
        for d in 1..=7 {
            last = claim_on(&f, &account.id, d).applied();
        }
        let seventh = last.unwrap();
        assert_eq!(seventh.streak_position, 7);
        assert!(seventh.cycle_completed);
        assert_eq!(seventh.granted_experience, 1000);

        let eighth = claim_on(&f, &account.id, 8).applied().unwrap();
        assert_eq!(eighth.streak_position, 1);
        assert!(!eighth.cycle_completed);

        let reloaded = reload(&f, &account.id);
        assert_eq!(reloaded.level, LevelCurve::default().level_for(reloaded.experience));
    }

    #[test]
    fn test_second_daily_claim_same_day_rejected() {
        let f = fixture();
        let account = open(&f, "alice");

        assert!(claim_on(&f, &account.id, 1).is_applied());
        let again = claim_on(&f, &account.id, 1);
        assert_eq!(again.rejection(), Some(&Rejection::AlreadyClaimed));
        assert_eq!(reload(&f, &account.id).balance, 1500);
    }

    #[test]
    fn test_daily_claim_unknown_account() {
        let f = fixture();
        let outcome = claim_on(&f, "missing", 1);
        assert_eq!(outcome.rejection(), Some(&Rejection::AccountNotFound));
    }

    #[test]
    fn test_daily_status() {
        let f = fixture();
        let account = open(&f, "alice");

        let fresh = f.rewards.daily_claim_status_on(&account.id, day(1)).unwrap().applied().unwrap();
        assert!(!fresh.claimed_today);
        assert_eq!(fresh.current_streak, 0);
        assert_eq!(fresh.next_streak_position, 1);
        assert!(fresh.schedule[0].can_claim);
        assert_eq!(fresh.schedule.len(), 7);

        claim_on(&f, &account.id, 1);
        claim_on(&f, &account.id, 2);

        let claimed = f.rewards.daily_claim_status_on(&account.id, day(2)).unwrap().applied().unwrap();
        assert!(claimed.claimed_today);
        assert_eq!(claimed.current_streak, 2);
        assert_eq!(claimed.next_streak_position, 3);
        assert!(claimed.schedule[1].is_today);
        assert!(claimed.schedule.iter().all(|d| !d.can_claim));
        assert_eq!(claimed.schedule.iter().filter(|d| d.claimed).count(), 2);

        let next_day = f.rewards.daily_claim_status_on(&account.id, day(3)).unwrap().applied().unwrap();
        assert!(next_day.schedule[2].can_claim);
        assert_eq!(next_day.next_reward.currency, 1000);
    }

    #[test]
    fn test_daily_history() {
        let f = fixture();
        let account = open(&f, "alice");
        for d in 1..=3 {
            claim_on(&f, &account.id, d);
        }

        let history = f
            .rewards
            .daily_claim_history(&account.id, PageRequest::new(1, 2))
            .unwrap()
            .applied()
            .unwrap();
        assert_eq!(history.claims.total, 3);
        assert_eq!(history.claims.items.len(), 2);
        assert!(history.claims.has_next);
        assert_eq!(history.total_currency_earned, 500 + 750 + 1000);
    }

    #[test]
    fn test_battle_pass_gating() {
        let f = fixture();
        let account = open(&f, "alice");
        // T(5) = 7000
        set_experience(&f, &account.id, 7000);
        assert_eq!(reload(&f, &account.id).level, 5);

        let too_high = f.rewards.claim_battle_pass_tier(&account.id, 10).unwrap();
        assert_eq!(
            too_high.rejection(),
            Some(&Rejection::InsufficientLevel { required: 10, current: 5 })
        );
        assert_eq!(reload(&f, &account.id).balance, 1000);

        let tier = f.rewards.claim_battle_pass_tier(&account.id, 5).unwrap().applied().unwrap();
        assert_eq!(tier.granted_currency, 500);
        assert_eq!(tier.new_balance, 1500);

        let again = f.rewards.claim_battle_pass_tier(&account.id, 5).unwrap();
        assert_eq!(again.rejection(), Some(&Rejection::AlreadyClaimed));

        let invalid = f.rewards.claim_battle_pass_tier(&account.id, 0).unwrap();
        assert_eq!(invalid.rejection(), Some(&Rejection::InvalidTier));

        // No experience from battle pass rewards
        assert_eq!(reload(&f, &account.id).experience, 7000);
    }

    #[test]
    fn test_battle_pass_gate_uses_derived_level() {
        let f = fixture();
        let account = open(&f, "alice");
        {
            // Experience says level 5, cached level still says 1
            let mut conn = f.db.conn().unwrap();
            let read = accounts::find(&mut conn, &account.id).unwrap().unwrap();
            accounts::update_totals(&mut conn, &read, read.balance, 7000, 1).unwrap();
        }

        let progress = f.rewards.battle_pass_progress(&account.id).unwrap().applied().unwrap();
        assert_eq!(progress.level, 5);
        assert_eq!(progress.claimable_tiers, vec![1, 2, 3, 4, 5]);

        let receipt = f.rewards.claim_battle_pass_tier(&account.id, 5).unwrap().applied().unwrap();
        assert_eq!(receipt.new_level, 5);
        assert_eq!(reload(&f, &account.id).level, 5);
    }

    #[test]
    fn test_battle_pass_progress() {
        let f = fixture();
        let account = open(&f, "alice");
        set_experience(&f, &account.id, 2500);

        f.rewards.claim_battle_pass_tier(&account.id, 2).unwrap();
        let progress = f.rewards.battle_pass_progress(&account.id).unwrap().applied().unwrap();
        assert_eq!(progress.level, 3);
        assert_eq!(progress.claimed_tiers, vec![2]);
        assert_eq!(progress.claimable_tiers, vec![1, 3]);
        assert_eq!(progress.total_currency_earned, 200);
    }

    #[test]
    fn test_referral_asymmetry() {
        let f = fixture();
        let referrer = open(&f, "rita");
        let referee = open(&f, "eli");

        let receipt = f
            .rewards
            .register_with_referral(&referee.id, &referrer.referral_code.to_lowercase())
            .unwrap()
            .applied()
            .unwrap();
        assert!(receipt.bonus_granted);
        assert_eq!(receipt.referrer_account_id, referrer.id);

        let referrer_after = reload(&f, &referrer.id);
        let referee_after = reload(&f, &referee.id);
        assert_eq!(referrer_after.balance, referrer.balance + 1000);
        assert_eq!(referrer_after.experience, referrer.experience + 500);
        assert_eq!(referee_after.balance, referee.balance + 1000);
        assert_eq!(referee_after.experience, referee.experience);

        let again = f.rewards.register_with_referral(&referee.id, &referrer.referral_code).unwrap();
        assert_eq!(again.rejection(), Some(&Rejection::AlreadyReferred));
    }

    #[test]
    fn test_mutual_referral_rejected() {
        let f = fixture();
        let alice = open(&f, "alice");
        let bob = open(&f, "bob");

        assert!(f.rewards.register_with_referral(&bob.id, &alice.referral_code).unwrap().is_applied());
        let back = f.rewards.register_with_referral(&alice.id, &bob.referral_code).unwrap();
        assert_eq!(back.rejection(), Some(&Rejection::ReferralNotEligible));

        // Only alice earned referrer experience
        assert_eq!(reload(&f, &alice.id).experience, 500);
        assert_eq!(reload(&f, &bob.id).experience, 0);
        assert_eq!(reload(&f, &alice.id).balance, 2000);
    }

    #[test]
    fn test_referral_requires_new_account() {
        let f = fixture();
        let rita = open(&f, "rita");
        let active = open(&f, "active");
        let veteran = open(&f, "veteran");

        f.rewards.purchase_item(&active.id, "hat", 100).unwrap();
        let after_activity = f.rewards.register_with_referral(&active.id, &rita.referral_code).unwrap();
        assert_eq!(after_activity.rejection(), Some(&Rejection::ReferralNotEligible));

        {
            use diesel_schema::accounts::dsl;
            let mut conn = f.db.conn().unwrap();
            diesel::update(dsl::accounts.filter(dsl::id.eq(&veteran.id)))
                .set(dsl::created_at.eq("2020-01-01T00:00:00Z"))
                .execute(&mut conn)
                .unwrap();
        }
        let older = f.rewards.register_with_referral(&veteran.id, &rita.referral_code).unwrap();
        assert_eq!(older.rejection(), Some(&Rejection::ReferralNotEligible));

        assert_eq!(reload(&f, &rita.id).balance, 1000);
        assert_eq!(reload(&f, &rita.id).experience, 0);
    }

    #[test]
    fn test_referral_rejections() {
        let f = fixture();
        let rita = open(&f, "rita");

        let own = f.rewards.register_with_referral(&rita.id, &rita.referral_code).unwrap();
        assert_eq!(own.rejection(), Some(&Rejection::SelfReferral));

        let unknown = f.rewards.register_with_referral(&rita.id, "ZZZZZZZZ").unwrap();
        assert_eq!(unknown.rejection(), Some(&Rejection::InvalidReferralCode));

        let blank = f.rewards.register_with_referral(&rita.id, "  ").unwrap();
        assert_eq!(blank.rejection(), Some(&Rejection::InvalidReferralCode));

        let missing = f.rewards.register_with_referral("missing", &rita.referral_code).unwrap();
        assert_eq!(missing.rejection(), Some(&Rejection::AccountNotFound));
        assert_eq!(reload(&f, &rita.id).balance, 1000);
    }

    #[test]
    fn test_purchase_with_cashback() {
        let f = fixture();
        let account = open(&f, "alice");

        let receipt = f.rewards.purchase_item(&account.id, "crown", 450).unwrap().applied().unwrap();
        assert_eq!(receipt.new_balance, 550);
        assert_eq!(receipt.cashback_experience, 45);
        assert_eq!(receipt.new_experience, 45);

        let card = f.rewards.purchase_card(&account.id, "dragon", 99).unwrap().applied().unwrap();
        assert_eq!(card.cashback_experience, 4);
        assert_eq!(card.new_balance, 451);
    }

    #[test]
    fn test_purchase_rejections_leave_balance() {
        let f = fixture();
        let account = open(&f, "alice");

        let too_expensive = f.rewards.purchase_item(&account.id, "castle", 5000).unwrap();
        assert_eq!(
            too_expensive.rejection(),
            Some(&Rejection::InsufficientFunds { required: 5000, available: 1000 })
        );
        let free = f.rewards.purchase_item(&account.id, "air", 0).unwrap();
        assert_eq!(free.rejection(), Some(&Rejection::InvalidAmount));

        let after = reload(&f, &account.id);
        assert_eq!(after.balance, 1000);
        assert_eq!(after.experience, 0);
    }

    #[test]
    fn test_build_status_after_completed_cycle() {
        let policy = RewardPolicy::default();
        let status = build_status(&policy, "acc", day(7), Some((day(7), 7)));
        assert!(status.claimed_today);
        assert!(status.schedule.iter().all(|d| d.claimed));
        assert_eq!(status.next_streak_position, 1);
    }
}
