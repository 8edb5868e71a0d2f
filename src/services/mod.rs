//! Service layer for pearl-ledger
//!
//! Services hold the economy rules between the caller (CLI, or an outer web
//! layer) and the repositories. Each service wraps database operations with:
//! - Input validation
//! - The atomic lock / guard / apply / verify / persist sequence
//! - Event emission after commit
//!
//! ## Architecture
//!
//! ```text
//! Caller (thin)
//!     ↓
//! Service Layer (rewards, transfers, history)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

mod atomic;
pub mod clock;
pub mod outcome;
pub mod policy;
pub mod streak;
pub mod receipts;
pub mod events;
pub mod account_service;
pub mod reward_service;
pub mod transfer_service;
pub mod history_service;

// Re-exports
pub use outcome::{Outcome, Rejection};
pub use policy::{DailyReward, PurchaseKind, RewardPolicy};
pub use receipts::*;
pub use clock::{Clock, SystemClock};
pub use events::{spawn_logging_listener, EventBus, EventListener, LedgerEvent};
pub use account_service::AccountService;
pub use reward_service::RewardService;
pub use transfer_service::TransferService;
pub use history_service::HistoryService;

use crate::db::LedgerDb;
use crate::error::LedgerError;
use std::sync::Arc;

/// Service container for dependency injection
///
/// Holds all services over one shared database pool and event bus.
pub struct Services {
    pub accounts: Arc<AccountService>,
    pub rewards: Arc<RewardService>,
    pub transfers: Arc<TransferService>,
    pub history: Arc<HistoryService>,
    pub events: Arc<EventBus>,
    pub policy: Arc<RewardPolicy>,
}

impl Services {
    /// Create all services with a shared database
    ///
    /// Fails if the reward policy does not validate.
    pub fn new(db: Arc<LedgerDb>, policy: RewardPolicy) -> Result<Self, LedgerError> {
        Self::with_clock(db, policy, Arc::new(SystemClock))
    }

    /// Same as [`Services::new`] with daily claims dated by `clock`
    pub fn with_clock(db: Arc<LedgerDb>, policy: RewardPolicy, clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        policy.validate()?;
        let events = Arc::new(EventBus::new());
        let policy = Arc::new(policy);

        Ok(Self {
            accounts: Arc::new(AccountService::new(db.clone(), events.clone(), policy.clone())),
            rewards: Arc::new(RewardService::new(db.clone(), events.clone(), policy.clone()).with_clock(clock)),
            transfers: Arc::new(TransferService::new(db.clone(), events.clone(), policy.clone())),
            history: Arc::new(HistoryService::new(db, policy.level_curve())),
            events,
            policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_reject_invalid_policy() {
        let db = Arc::new(LedgerDb::open_in_memory().unwrap());
        let policy = RewardPolicy {
            daily_experience: vec![10; 3],
            ..Default::default()
        };
        assert!(matches!(Services::new(db, policy), Err(LedgerError::Config(_))));
    }

    #[tokio::test]
    async fn test_events_follow_commits_only() {
        let db = Arc::new(LedgerDb::open_in_memory().unwrap());
        let services = Services::new(db, RewardPolicy::default()).unwrap();
        let mut receiver = services.events.subscribe();

        let alice = services.accounts.open_account("alice", None).unwrap().applied().unwrap();
        // Rejected: nothing emitted
        services.rewards.purchase_item(&alice.id, "castle", 1_000_000).unwrap();
        services.rewards.purchase_item(&alice.id, "hat", 100).unwrap();

        let first = receiver.recv().await.unwrap();
        assert!(matches!(first, LedgerEvent::AccountOpened { .. }));
        let second = receiver.recv().await.unwrap();
        assert!(matches!(second, LedgerEvent::PurchaseCompleted { price: 100, .. }));
        assert!(receiver.try_recv().is_err());
    }
}
