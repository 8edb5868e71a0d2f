//! Event system for economy operations
//!
//! Services publish a [`LedgerEvent`] after a mutation commits. Nothing is
//! emitted for rejected or rolled-back operations.
//! Useful for:
//! - Audit logging
//! - Notifications (level-ups, received transfers)

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::db::Account;

/// Committed economy events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    AccountOpened {
        account_id: String,
        username: String,
    },
    DailyClaimed {
        account_id: String,
        streak_position: i32,
        currency: i64,
        experience: i64,
    },
    BattlePassClaimed {
        account_id: String,
        tier: i32,
        currency: i64,
    },
    ReferralApplied {
        referrer_id: String,
        referee_id: String,
    },
    PurchaseCompleted {
        account_id: String,
        item_id: String,
        price: i64,
        cashback_experience: i64,
    },
    TransferCompleted {
        sender_id: String,
        recipient_id: String,
        amount: i64,
        reference: String,
    },
    LevelUp {
        account_id: String,
        from_level: i32,
        to_level: i32,
    },
}

impl LedgerEvent {
    /// `LevelUp` if the level went up between the two snapshots
    pub fn level_change(before: &Account, after: &Account) -> Option<Self> {
        (after.level > before.level).then(|| LedgerEvent::LevelUp {
            account_id: after.id.clone(),
            from_level: before.level,
            to_level: after.level,
        })
    }
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &LedgerEvent);
}

/// Event bus for broadcasting ledger events
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: LedgerEvent) {
        trace!(event = ?event, "Emitting ledger event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::LevelUp { account_id, from_level, to_level } => {
                info!(account_id = %account_id, from_level, to_level, "Level up");
            }
            LedgerEvent::TransferCompleted { sender_id, recipient_id, amount, reference } => {
                debug!(
                    sender = %sender_id,
                    recipient = %recipient_id,
                    amount,
                    reference = %reference,
                    "Transfer completed"
                );
            }
            LedgerEvent::ReferralApplied { referrer_id, referee_id } => {
                debug!(referrer = %referrer_id, referee = %referee_id, "Referral applied");
            }
            _ => {
                trace!(event = ?event, "Ledger event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn account(level: i32) -> Account {
        Account {
            id: "acc-1".into(),
            username: "alice".into(),
            email: None,
            wallet_address: "pearl:0x01".into(),
            referral_code: "CODE0001".into(),
            balance: 0,
            experience: 0,
            level,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(LedgerEvent::BattlePassClaimed {
            account_id: "acc-1".into(),
            tier: 3,
            currency: 300,
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            LedgerEvent::BattlePassClaimed { tier, currency, .. } => {
                assert_eq!(tier, 3);
                assert_eq!(currency, 300);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        bus.emit(LedgerEvent::ReferralApplied {
            referrer_id: "r".into(),
            referee_id: "e".into(),
        });
    }

    #[test]
    fn test_level_change() {
        assert!(LedgerEvent::level_change(&account(2), &account(2)).is_none());
        assert_eq!(
            LedgerEvent::level_change(&account(2), &account(4)),
            Some(LedgerEvent::LevelUp {
                account_id: "acc-1".into(),
                from_level: 2,
                to_level: 4,
            })
        );
    }
}
