//! Reward policy table
//!
//! How much currency and experience each action grants. Loaded from the
//! `[rewards]` section of the config file; every field has a default.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::streak::CYCLE_LENGTH;
use crate::db::models::entry_causes;
use crate::error::LedgerError;
use crate::progression::{LevelCurve, DEFAULT_MAX_LEVEL};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardPolicy {
    /// Currency credited when an account is opened
    pub starting_bonus: i64,
    /// Currency by day-in-cycle, index 0 is day 1
    pub daily_currency: Vec<i64>,
    /// Experience by day-in-cycle, index 0 is day 1
    pub daily_experience: Vec<i64>,
    /// Applied to the experience of the day that completes the cycle
    pub cycle_completion_experience_multiplier: i64,
    pub referrer_currency: i64,
    pub referee_currency: i64,
    /// Referees get no experience
    pub referrer_experience: i64,
    pub avatar_cashback_percent: i64,
    pub card_cashback_percent: i64,
    pub battle_pass_currency_per_tier: i64,
    pub max_transfer_amount: i64,
    pub max_level: i32,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            starting_bonus: 1000,
            daily_currency: vec![500, 750, 1000, 1500, 2000, 3000, 5000],
            daily_experience: vec![50, 75, 100, 150, 200, 300, 500],
            cycle_completion_experience_multiplier: 2,
            referrer_currency: 1000,
            referee_currency: 1000,
            referrer_experience: 500,
            avatar_cashback_percent: 10,
            card_cashback_percent: 5,
            battle_pass_currency_per_tier: 100,
            max_transfer_amount: 1_000_000,
            max_level: DEFAULT_MAX_LEVEL,
        }
    }
}

/// Currency and experience for one day of the streak cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyReward {
    pub currency: i64,
    pub experience: i64,
}

/// What kind of thing was bought, which decides cashback and ledger cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseKind {
    AvatarItem,
    Card,
}

impl PurchaseKind {
    pub fn cause(&self) -> &'static str {
        match self {
            PurchaseKind::AvatarItem => entry_causes::PURCHASE,
            PurchaseKind::Card => entry_causes::CARD_PURCHASE,
        }
    }

    /// Prefix of the ledger reference for this kind
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            PurchaseKind::AvatarItem => "BUY",
            PurchaseKind::Card => "CARD",
        }
    }
}

impl FromStr for PurchaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "avatar" | "avatar_item" | "item" => Ok(PurchaseKind::AvatarItem),
            "card" => Ok(PurchaseKind::Card),
            other => Err(format!("unknown purchase kind '{}'", other)),
        }
    }
}

impl RewardPolicy {
    /// Reject tables the reward engine cannot use
    pub fn validate(&self) -> Result<(), LedgerError> {
        let cycle = CYCLE_LENGTH as usize;
        if self.daily_currency.len() != cycle || self.daily_experience.len() != cycle {
            return Err(LedgerError::Config(format!(
                "daily reward tables must have exactly {} entries",
                cycle
            )));
        }

        let scalars = [
            ("starting_bonus", self.starting_bonus),
            ("cycle_completion_experience_multiplier", self.cycle_completion_experience_multiplier),
            ("referrer_currency", self.referrer_currency),
            ("referee_currency", self.referee_currency),
            ("referrer_experience", self.referrer_experience),
            ("avatar_cashback_percent", self.avatar_cashback_percent),
            ("card_cashback_percent", self.card_cashback_percent),
            ("battle_pass_currency_per_tier", self.battle_pass_currency_per_tier),
            ("max_transfer_amount", self.max_transfer_amount),
        ];
        if let Some((name, _)) = scalars.iter().find(|(_, v)| *v < 0) {
            return Err(LedgerError::Config(format!("{} must not be negative", name)));
        }
        if self.daily_currency.iter().chain(&self.daily_experience).any(|v| *v < 0) {
            return Err(LedgerError::Config("daily rewards must not be negative".into()));
        }
        if self.max_level < 1 {
            return Err(LedgerError::Config("max_level must be at least 1".into()));
        }
        Ok(())
    }

    pub fn level_curve(&self) -> LevelCurve {
        LevelCurve::new(self.max_level)
    }

    /// Reward for a streak position in `1..=7`
    ///
    /// Positions outside the cycle are clamped into it.
    pub fn daily_reward(&self, streak_position: i32) -> DailyReward {
        let position = streak_position.clamp(1, CYCLE_LENGTH);
        let index = (position - 1) as usize;
        let currency = self.daily_currency.get(index).copied().unwrap_or(0);
        let mut experience = self.daily_experience.get(index).copied().unwrap_or(0);

        if position == CYCLE_LENGTH {
            experience *= self.cycle_completion_experience_multiplier;
        }

        DailyReward { currency, experience }
    }

    /// Cashback experience for a purchase, truncated toward zero
    pub fn cashback_experience(&self, kind: PurchaseKind, price: i64) -> i64 {
        let percent = match kind {
            PurchaseKind::AvatarItem => self.avatar_cashback_percent,
            PurchaseKind::Card => self.card_cashback_percent,
        };
        price.max(0) * percent / 100
    }

    pub fn battle_pass_currency(&self, tier: i32) -> i64 {
        i64::from(tier) * self.battle_pass_currency_per_tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        assert!(RewardPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_tables() {
        let short = RewardPolicy {
            daily_currency: vec![1, 2, 3],
            ..Default::default()
        };
        assert!(short.validate().is_err());

        let negative = RewardPolicy {
            referee_currency: -1,
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        let no_levels = RewardPolicy {
            max_level: 0,
            ..Default::default()
        };
        assert!(no_levels.validate().is_err());
    }

    #[test]
    fn test_daily_reward_cycle() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.daily_reward(1), DailyReward { currency: 500, experience: 50 });
        assert_eq!(policy.daily_reward(2), DailyReward { currency: 750, experience: 75 });
        // Day 7 doubles experience
        assert_eq!(policy.daily_reward(7), DailyReward { currency: 5000, experience: 1000 });
    }

    #[test]
    fn test_cashback_truncates() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.cashback_experience(PurchaseKind::AvatarItem, 1000), 100);
        assert_eq!(policy.cashback_experience(PurchaseKind::AvatarItem, 19), 1);
        assert_eq!(policy.cashback_experience(PurchaseKind::AvatarItem, 9), 0);
        assert_eq!(policy.cashback_experience(PurchaseKind::Card, 999), 49);
    }

    #[test]
    fn test_policy_from_partial_toml() {
        let policy: RewardPolicy = toml::from_str("starting_bonus = 250").unwrap();
        assert_eq!(policy.starting_bonus, 250);
        assert_eq!(policy.daily_currency.len(), 7);
    }

    #[test]
    fn test_purchase_kind_parse() {
        assert_eq!("card".parse::<PurchaseKind>().unwrap(), PurchaseKind::Card);
        assert_eq!("Avatar".parse::<PurchaseKind>().unwrap(), PurchaseKind::AvatarItem);
        assert!("boat".parse::<PurchaseKind>().is_err());
    }
}
