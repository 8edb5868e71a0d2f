//! Error types for pearl-ledger
//!
//! Expected business outcomes (already claimed, insufficient funds, ...) are
//! not errors here; they are [`crate::services::Rejection`] values. A
//! `LedgerError` always means the request failed and was rolled back.

use thiserror::Error;

/// Message shown across the service boundary for any fault
const PUBLIC_FAULT_MESSAGE: &str =
    "Something went wrong while updating your pearls. Please try again.";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(
        "Balance verification failed for account {account_id}: \
         expected balance={expected_balance} experience={expected_experience}, \
         found balance={actual_balance} experience={actual_experience}"
    )]
    BalanceVerification {
        account_id: String,
        expected_balance: i64,
        actual_balance: i64,
        expected_experience: i64,
        actual_experience: i64,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Opaque text safe to show to the caller. Internal detail stays in logs.
    pub fn public_message(&self) -> &'static str {
        PUBLIC_FAULT_MESSAGE
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::BalanceVerification { .. }
                | LedgerError::Database(_)
                | LedgerError::Pool(_)
        )
    }
}

impl From<diesel::result::Error> for LedgerError {
    fn from(e: diesel::result::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for LedgerError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        LedgerError::Pool(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_message_hides_detail() {
        let err = LedgerError::Database("UNIQUE constraint failed: accounts.secret".into());
        assert!(!err.public_message().contains("accounts"));
        assert!(err.to_string().contains("accounts.secret"));
    }

    #[test]
    fn test_retryable_classification() {
        let verification = LedgerError::BalanceVerification {
            account_id: "a".into(),
            expected_balance: 10,
            actual_balance: 5,
            expected_experience: 0,
            actual_experience: 0,
        };
        assert!(verification.is_retryable());
        assert!(!LedgerError::Config("bad".into()).is_retryable());
    }
}
