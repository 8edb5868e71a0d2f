//! Outcome types for economy operations
//!
//! A service call either applies its mutation or is turned away for a
//! business reason. Both are normal results; only storage or integrity
//! faults travel as [`crate::error::LedgerError`].

use serde::Serialize;
use thiserror::Error;

/// Expected, user-facing reasons an operation did not apply
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    #[error("This reward has already been claimed")]
    AlreadyClaimed,

    #[error("Insufficient pearls: {required} needed, {available} available")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Level {required} required, you are level {current}")]
    InsufficientLevel { required: i32, current: i32 },

    #[error("Account not found")]
    AccountNotFound,

    #[error("Recipient not found")]
    InvalidRecipient,

    #[error("You cannot send pearls to yourself")]
    SelfTransferForbidden,

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Invalid battle pass tier")]
    InvalidTier,

    #[error("Invalid referral code")]
    InvalidReferralCode,

    #[error("You cannot use your own referral code")]
    SelfReferral,

    #[error("This account has already been referred")]
    AlreadyReferred,

    #[error("Referral codes can only be used by a newly registered account")]
    ReferralNotEligible,

    #[error("An account with this {field} already exists")]
    DuplicateAccount { field: String },

    #[error("Invalid account details: {detail}")]
    InvalidAccountDetails { detail: String },
}

/// Result of an operation that may be turned away
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum Outcome<T> {
    Applied(T),
    Rejected(Rejection),
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Outcome::Applied(_) => None,
            Outcome::Rejected(rejection) => Some(rejection),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Applied(value) => Outcome::Applied(f(value)),
            Outcome::Rejected(rejection) => Outcome::Rejected(rejection),
        }
    }
}

impl<T> From<Rejection> for Outcome<T> {
    fn from(rejection: Rejection) -> Self {
        Outcome::Rejected(rejection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages() {
        let funds = Rejection::InsufficientFunds { required: 500, available: 200 };
        assert_eq!(funds.to_string(), "Insufficient pearls: 500 needed, 200 available");

        let level = Rejection::InsufficientLevel { required: 10, current: 5 };
        assert_eq!(level.to_string(), "Level 10 required, you are level 5");
    }

    #[test]
    fn test_outcome_serialization() {
        let applied: Outcome<i64> = Outcome::Applied(42);
        let json = serde_json::to_value(&applied).unwrap();
        assert_eq!(json["status"], "applied");
        assert_eq!(json["result"], 42);

        let rejected: Outcome<i64> = Rejection::AlreadyClaimed.into();
        let json = serde_json::to_value(&rejected).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["result"]["reason"], "already_claimed");
    }

    #[test]
    fn test_outcome_helpers() {
        let applied: Outcome<i32> = Outcome::Applied(2);
        assert!(applied.is_applied());
        assert_eq!(applied.clone().map(|v| v * 2).applied(), Some(4));
        assert!(applied.rejection().is_none());

        let rejected: Outcome<i32> = Outcome::Rejected(Rejection::InvalidTier);
        assert_eq!(rejected.rejection(), Some(&Rejection::InvalidTier));
        assert_eq!(rejected.applied(), None);
    }
}
