//! Transfer service - peer-to-peer currency transfers
//!
//! Both sides are debited/credited inside one transaction with one ledger
//! entry each, sharing a `TRF-` reference. Transfers grant no experience.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::db::models::{current_timestamp, entry_causes};
use crate::db::{accounts, LedgerDb};
use crate::error::LedgerError;
use crate::progression::LevelCurve;

use super::atomic::{append_entries, apply_grant, lock_account, lock_pair, run_atomic, EntryDraft, Grant};
use super::events::{EventBus, LedgerEvent};
use super::outcome::{Outcome, Rejection};
use super::policy::RewardPolicy;
use super::receipts::TransferReceipt;

pub struct TransferService {
    db: Arc<LedgerDb>,
    events: Arc<EventBus>,
    policy: Arc<RewardPolicy>,
    curve: LevelCurve,
}

impl TransferService {
    pub fn new(db: Arc<LedgerDb>, events: Arc<EventBus>, policy: Arc<RewardPolicy>) -> Self {
        let curve = policy.level_curve();
        Self { db, events, policy, curve }
    }

    /// Send `amount` to the account named by `recipient_identifier`
    ///
    /// The recipient may be given as wallet address, email or username.
    pub fn transfer_currency(
        &self,
        sender_id: &str,
        recipient_identifier: &str,
        amount: i64,
    ) -> Result<Outcome<TransferReceipt>, LedgerError> {
        if amount <= 0 || amount > self.policy.max_transfer_amount {
            return Ok(Outcome::Rejected(Rejection::InvalidAmount));
        }
        let reference = format!("TRF-{}", Uuid::new_v4().simple());

        let outcome = run_atomic(&self.db, "transfer_currency", |conn| {
            let sender = lock_account(conn, sender_id)?;
            let recipient = accounts::resolve_identifier(conn, recipient_identifier)?
                .ok_or(Rejection::InvalidRecipient)?;
            if recipient.id == sender.id {
                return Err(Rejection::SelfTransferForbidden.into());
            }

            let (sender, recipient) = lock_pair(conn, &sender.id, &recipient.id)?;
            if sender.balance < amount {
                return Err(Rejection::InsufficientFunds {
                    required: amount,
                    available: sender.balance,
                }
                .into());
            }

            let sender_after = apply_grant(conn, &sender, Grant { currency: -amount, experience: 0 }, &self.curve)?;
            apply_grant(conn, &recipient, Grant { currency: amount, experience: 0 }, &self.curve)?;

            let now = current_timestamp();
            let sent = append_entries(
                conn,
                &sender.id,
                &[EntryDraft {
                    cause: entry_causes::TRANSFER_SENT,
                    amount: -amount,
                    counterparty_id: Some(recipient.id.clone()),
                    description: format!("Sent {} pearls to {}", amount, recipient.username),
                    reference: reference.clone(),
                }],
                &now,
            )?;
            append_entries(
                conn,
                &recipient.id,
                &[EntryDraft {
                    cause: entry_causes::TRANSFER_RECEIVED,
                    amount,
                    counterparty_id: Some(sender.id.clone()),
                    description: format!("Received {} pearls from {}", amount, sender.username),
                    reference: reference.clone(),
                }],
                &now,
            )?;

            let transfer_record_id = sent
                .first()
                .map(|entry| entry.id)
                .ok_or_else(|| LedgerError::Internal("transfer wrote no sender entry".into()))?;

            Ok(TransferReceipt {
                transfer_record_id,
                reference: reference.clone(),
                amount,
                recipient_account_id: recipient.id,
                new_sender_balance: sender_after.balance,
            })
        })?;

        Ok(outcome.map(|receipt| {
            info!(
                sender_id = %sender_id,
                recipient_id = %receipt.recipient_account_id,
                amount,
                reference = %receipt.reference,
                "Transfer completed"
            );
            self.events.emit(LedgerEvent::TransferCompleted {
                sender_id: sender_id.to_string(),
                recipient_id: receipt.recipient_account_id.clone(),
                amount,
                reference: receipt.reference.clone(),
            });
            receipt
        }))
    }
}
