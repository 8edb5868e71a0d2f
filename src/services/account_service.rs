//! Account service - opening accounts and reading progression
//!
//! Registration itself (credentials, sessions) lives outside this crate; the
//! caller hands over a username and optional email once they are accepted.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::accounts::{self, AccountInsert, WALLET_ADDRESS_PREFIX};
use crate::db::models::{current_timestamp, entry_causes, NewAccount};
use crate::db::{Account, LedgerDb};
use crate::error::LedgerError;
use crate::progression::{LevelCurve, LevelProgress};

use super::atomic::{append_entries, run_atomic, EntryDraft};
use super::events::{EventBus, LedgerEvent};
use super::outcome::{Outcome, Rejection};
use super::policy::RewardPolicy;

/// Length of generated referral codes
pub const REFERRAL_CODE_LENGTH: usize = 8;

const REFERRAL_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const MAX_USERNAME_LENGTH: usize = 32;

/// Attempts before giving up on a colliding wallet address or referral code
const MAX_IDENTITY_ATTEMPTS: usize = 5;

/// `pearl:0x` followed by 40 lowercase hex characters
pub fn generate_wallet_address() -> String {
    let bytes: [u8; 20] = rand::random();
    format!("{}0x{}", WALLET_ADDRESS_PREFIX, hex::encode(bytes))
}

/// Eight uppercase alphanumerics
pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LENGTH)
        .map(|_| REFERRAL_CODE_CHARSET[rng.gen_range(0..REFERRAL_CODE_CHARSET.len())] as char)
        .collect()
}

/// Account service
pub struct AccountService {
    db: Arc<LedgerDb>,
    events: Arc<EventBus>,
    policy: Arc<RewardPolicy>,
    curve: LevelCurve,
}

impl AccountService {
    pub fn new(db: Arc<LedgerDb>, events: Arc<EventBus>, policy: Arc<RewardPolicy>) -> Self {
        let curve = policy.level_curve();
        Self { db, events, policy, curve }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get account by ID
    pub fn get(&self, account_id: &str) -> Result<Option<Account>, LedgerError> {
        self.db.with_conn(|conn| accounts::find(conn, account_id))
    }

    /// Look up an account by wallet address, email or username
    pub fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, LedgerError> {
        self.db.with_conn(|conn| accounts::resolve_identifier(conn, identifier))
    }

    /// Where an experience total sits on the level curve
    pub fn level_progress(&self, experience: i64) -> LevelProgress {
        self.curve.progress(experience)
    }

    pub fn account_level_progress(&self, account_id: &str) -> Result<Outcome<LevelProgress>, LedgerError> {
        Ok(match self.get(account_id)? {
            Some(account) => Outcome::Applied(self.curve.progress(account.experience)),
            None => Outcome::Rejected(Rejection::AccountNotFound),
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Open an account credited with the starting bonus
    pub fn open_account(&self, username: &str, email: Option<&str>) -> Result<Outcome<Account>, LedgerError> {
        let username = username.trim().to_lowercase();
        let email = email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());

        if let Err(rejection) = validate_identity(&username, email.as_deref()) {
            debug!(username = %username, rejection = %rejection, "Account details rejected");
            return Ok(Outcome::Rejected(rejection));
        }

        for attempt in 1..=MAX_IDENTITY_ATTEMPTS {
            let id = Uuid::new_v4().to_string();
            let wallet_address = generate_wallet_address();
            let referral_code = generate_referral_code();

            let outcome = run_atomic(&self.db, "open_account", |conn| {
                let now = current_timestamp();
                let new_account = NewAccount {
                    id: &id,
                    username: &username,
                    email: email.as_deref(),
                    wallet_address: &wallet_address,
                    referral_code: &referral_code,
                    balance: self.policy.starting_bonus,
                    experience: 0,
                    level: self.curve.level_for(0),
                    created_at: &now,
                    updated_at: &now,
                };

                match accounts::insert(conn, &new_account)? {
                    AccountInsert::Created(account) => {
                        append_entries(
                            conn,
                            &account.id,
                            &[EntryDraft {
                                cause: entry_causes::STARTING_BONUS,
                                amount: self.policy.starting_bonus,
                                counterparty_id: None,
                                description: format!("Welcome bonus ({} pearls)", self.policy.starting_bonus),
                                reference: format!("SIGNUP-{}", account.id),
                            }],
                            &now,
                        )?;
                        Ok(account)
                    }
                    AccountInsert::Duplicate { field } => Err(Rejection::DuplicateAccount { field }.into()),
                }
            })?;

            match outcome {
                Outcome::Rejected(Rejection::DuplicateAccount { field })
                    if field == "wallet_address" || field == "referral_code" || field == "id" =>
                {
                    debug!(attempt, field = %field, "Generated identity collided, retrying");
                }
                Outcome::Applied(account) => {
                    info!(
                        account_id = %account.id,
                        username = %account.username,
                        balance = account.balance,
                        "Account opened"
                    );
                    self.events.emit(LedgerEvent::AccountOpened {
                        account_id: account.id.clone(),
                        username: account.username.clone(),
                    });
                    return Ok(Outcome::Applied(account));
                }
                rejected => return Ok(rejected),
            }
        }

        Err(LedgerError::Internal(
            "Could not generate a unique wallet address and referral code".into(),
        ))
    }
}

/// Usernames must stay distinguishable from wallet addresses and emails
fn validate_identity(username: &str, email: Option<&str>) -> Result<(), Rejection> {
    let invalid = |detail: &str| Rejection::InvalidAccountDetails { detail: detail.to_string() };

    if username.is_empty() {
        return Err(invalid("username is required"));
    }
    if username.len() > MAX_USERNAME_LENGTH {
        return Err(invalid("username is too long"));
    }
    if username.starts_with(WALLET_ADDRESS_PREFIX) {
        return Err(invalid("username cannot look like a wallet address"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    {
        return Err(invalid("username may only contain letters, digits, '_', '.' and '-'"));
    }
    if let Some(email) = email {
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(invalid("email is not valid"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ledger;

    fn service() -> AccountService {
        let db = Arc::new(LedgerDb::open_in_memory().unwrap());
        AccountService::new(db, Arc::new(EventBus::new()), Arc::new(RewardPolicy::default()))
    }

    #[test]
    fn test_generated_identity_format() {
        let address = generate_wallet_address();
        assert!(address.starts_with("pearl:0x"));
        assert_eq!(address.len(), "pearl:0x".len() + 40);
        assert!(address["pearl:0x".len()..].chars().all(|c| c.is_ascii_hexdigit()));

        let code = generate_referral_code();
        assert_eq!(code.len(), REFERRAL_CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_open_account_grants_starting_bonus() {
        let service = service();
        let account = service
            .open_account("Alice", Some("Alice@Example.com"))
            .unwrap()
            .applied()
            .unwrap();

        assert_eq!(account.username, "alice");
        assert_eq!(account.email.as_deref(), Some("alice@example.com"));
        assert_eq!(account.balance, 1000);
        assert_eq!(account.experience, 0);
        assert_eq!(account.level, 1);

        let mut conn = service.db.conn().unwrap();
        let entries = ledger::list(&mut conn, &account.id, None, Default::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].cause, entry_causes::STARTING_BONUS);
        assert_eq!(entries[0].amount, 1000);
        assert_eq!(entries[0].reference, format!("SIGNUP-{}", account.id));
    }

    #[test]
    fn test_duplicate_username_and_email() {
        let service = service();
        service.open_account("alice", Some("a@example.com")).unwrap();

        let same_name = service.open_account("ALICE", None).unwrap();
        assert_eq!(
            same_name.rejection(),
            Some(&Rejection::DuplicateAccount { field: "username".into() })
        );

        let same_email = service.open_account("bob", Some("a@example.com")).unwrap();
        assert_eq!(
            same_email.rejection(),
            Some(&Rejection::DuplicateAccount { field: "email".into() })
        );
    }

    #[test]
    fn test_invalid_details_rejected() {
        let service = service();
        for name in ["", "pearl:0xabc", "bob@example.com", "has space"] {
            let outcome = service.open_account(name, None).unwrap();
            assert!(
                matches!(outcome.rejection(), Some(Rejection::InvalidAccountDetails { .. })),
                "{} should be rejected",
                name
            );
        }
        let bad_email = service.open_account("carol", Some("not-an-email")).unwrap();
        assert!(matches!(bad_email.rejection(), Some(Rejection::InvalidAccountDetails { .. })));
    }

    #[test]
    fn test_find_by_identifier() {
        let service = service();
        let account = service.open_account("dora", Some("dora@example.com")).unwrap().applied().unwrap();

        for identifier in [account.wallet_address.as_str(), "dora@example.com", "Dora"] {
            let found = service.find_by_identifier(identifier).unwrap().unwrap();
            assert_eq!(found.id, account.id);
        }
    }

    #[test]
    fn test_level_progress() {
        let service = service();
        let progress = service.level_progress(1200);
        assert_eq!(progress.level, 2);
        assert_eq!(progress.next_level_threshold, Some(2500));

        let missing = service.account_level_progress("nope").unwrap();
        assert_eq!(missing.rejection(), Some(&Rejection::AccountNotFound));
    }
}
