//! Pearl Ledger - economy core for the Pearl Verse social platform
//!
//! Holds account balances, experience and levels, and applies every reward,
//! purchase and transfer so that balances never go negative, a reward is never
//! granted twice, and currency is never lost or duplicated under concurrent
//! requests.
//!
//! ## Architecture
//!
//! - **Balance store**: `accounts` table, the unit of mutation and locking
//! - **Level curve**: pure `level_for(experience)` in [`progression`]
//! - **Claim ledger**: uniquely keyed claim records, the idempotency guard
//! - **Transaction log**: one signed ledger entry per balance delta
//! - **Reward engine**: policy table plus the atomic reward template
//! - **Peer transfer**: two-account debit/credit through the same template
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/pearl-ledger/
//! ├── ledger.db        # SQLite (WAL): accounts, claims, ledger, referrals
//! └── config.toml      # Configuration and [rewards] policy
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod progression;
pub mod services;

// Re-exports
pub use config::Config;
pub use db::{Account, ClaimRecord, LedgerDb, LedgerEntry, Page, PageRequest, ReferralLink};
pub use error::LedgerError;
pub use progression::{level_for, LevelCurve, LevelProgress};
pub use services::{Clock, Outcome, Rejection, RewardPolicy, Services, SystemClock};
