//! Balance store operations
//!
//! Every write here expects to run inside an `IMMEDIATE` transaction opened
//! by the service layer; these functions never open transactions themselves.

use diesel::prelude::*;
use diesel::result::Error as DieselError;

use super::diesel_schema::accounts;
use super::is_unique_violation;
use super::models::{Account, NewAccount};
use crate::error::LedgerError;

/// Prefix that marks an identifier as a wallet address
pub const WALLET_ADDRESS_PREFIX: &str = "pearl:";

/// Result of inserting an account
#[derive(Debug)]
pub enum AccountInsert {
    Created(Account),
    /// A unique column already holds this value
    Duplicate { field: String },
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get account by ID
pub fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Account>, LedgerError> {
    accounts::table
        .find(id)
        .select(Account::as_select())
        .first(conn)
        .optional()
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

pub fn find_by_username(conn: &mut SqliteConnection, username: &str) -> Result<Option<Account>, LedgerError> {
    accounts::table
        .filter(accounts::username.eq(username))
        .select(Account::as_select())
        .first(conn)
        .optional()
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

pub fn find_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Option<Account>, LedgerError> {
    accounts::table
        .filter(accounts::email.eq(email))
        .select(Account::as_select())
        .first(conn)
        .optional()
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

pub fn find_by_wallet_address(conn: &mut SqliteConnection, address: &str) -> Result<Option<Account>, LedgerError> {
    accounts::table
        .filter(accounts::wallet_address.eq(address))
        .select(Account::as_select())
        .first(conn)
        .optional()
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

pub fn find_by_referral_code(conn: &mut SqliteConnection, code: &str) -> Result<Option<Account>, LedgerError> {
    accounts::table
        .filter(accounts::referral_code.eq(code))
        .select(Account::as_select())
        .first(conn)
        .optional()
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

/// Resolve a recipient identifier
///
/// `pearl:...` is a wallet address, anything with `@` is an email, and
/// everything else is a username.
pub fn resolve_identifier(conn: &mut SqliteConnection, identifier: &str) -> Result<Option<Account>, LedgerError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Ok(None);
    }

    if identifier.starts_with(WALLET_ADDRESS_PREFIX) {
        find_by_wallet_address(conn, identifier)
    } else if identifier.contains('@') {
        find_by_email(conn, &identifier.to_lowercase())
    } else {
        find_by_username(conn, &identifier.to_lowercase())
    }
}

/// Load several accounts in ascending id order
///
/// Two-account operations read through here so that row locks, on a backend
/// that has them, are always taken in the same order.
pub fn load_in_lock_order(conn: &mut SqliteConnection, ids: &[&str]) -> Result<Vec<Account>, LedgerError> {
    accounts::table
        .filter(accounts::id.eq_any(ids))
        .order(accounts::id.asc())
        .select(Account::as_select())
        .load(conn)
        .map_err(|e| LedgerError::Database(format!("Query failed: {}", e)))
}

// ============================================================================
// Write Operations
// ============================================================================

/// Insert a new account, reporting which unique field collided
pub fn insert(conn: &mut SqliteConnection, new_account: &NewAccount<'_>) -> Result<AccountInsert, LedgerError> {
    match diesel::insert_into(accounts::table)
        .values(new_account)
        .execute(conn)
    {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Ok(AccountInsert::Duplicate {
                field: duplicate_field(&e),
            });
        }
        Err(e) => return Err(LedgerError::Database(format!("Insert failed: {}", e))),
    }

    find(conn, new_account.id)?
        .map(AccountInsert::Created)
        .ok_or_else(|| LedgerError::Internal("Failed to retrieve created account".into()))
}

/// Compare-and-set update of the mutable totals
///
/// Only matches when balance and experience still hold the values the
/// caller read; returns the number of rows changed (0 or 1).
pub fn update_totals(
    conn: &mut SqliteConnection,
    read: &Account,
    balance: i64,
    experience: i64,
    level: i32,
) -> Result<usize, LedgerError> {
    diesel::update(
        accounts::table
            .filter(accounts::id.eq(&read.id))
            .filter(accounts::balance.eq(read.balance))
            .filter(accounts::experience.eq(read.experience)),
    )
    .set((
        accounts::balance.eq(balance),
        accounts::experience.eq(experience),
        accounts::level.eq(level),
        accounts::updated_at.eq(super::models::current_timestamp()),
    ))
    .execute(conn)
    .map_err(|e| LedgerError::Database(format!("Update failed: {}", e)))
}

/// Overwrite only the cached level
#[cfg(test)]
pub fn set_level(conn: &mut SqliteConnection, id: &str, level: i32) -> Result<usize, LedgerError> {
    diesel::update(accounts::table.filter(accounts::id.eq(id)))
        .set(accounts::level.eq(level))
        .execute(conn)
        .map_err(|e| LedgerError::Database(format!("Update failed: {}", e)))
}

/// Column named in a SQLite "UNIQUE constraint failed: accounts.<col>" message
fn duplicate_field(err: &DieselError) -> String {
    if let DieselError::DatabaseError(_, info) = err {
        if let Some(rest) = info.message().split("accounts.").nth(1) {
            return rest
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .next()
                .unwrap_or("unknown")
                .to_string();
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::current_timestamp;
    use crate::db::schema::init_schema;
    use diesel::Connection;

    fn setup_test_db() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:")
            .expect("Failed to create in-memory database");
        init_schema(&mut conn).expect("Failed to create schema");
        conn
    }

    fn new_account<'a>(id: &'a str, username: &'a str, email: Option<&'a str>, wallet: &'a str, code: &'a str, now: &'a str) -> NewAccount<'a> {
        NewAccount {
            id,
            username,
            email,
            wallet_address: wallet,
            referral_code: code,
            balance: 1000,
            experience: 0,
            level: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_and_resolve() {
        let mut conn = setup_test_db();
        let now = current_timestamp();
        let created = insert(
            &mut conn,
            &new_account("acc-1", "alice", Some("alice@example.com"), "pearl:0xaaaa", "ALICE001", &now),
        )
        .unwrap();
        assert!(matches!(created, AccountInsert::Created(ref a) if a.balance == 1000));

        let by_wallet = resolve_identifier(&mut conn, "pearl:0xaaaa").unwrap().unwrap();
        let by_email = resolve_identifier(&mut conn, "Alice@Example.com").unwrap().unwrap();
        let by_name = resolve_identifier(&mut conn, " alice ").unwrap().unwrap();
        assert_eq!(by_wallet.id, "acc-1");
        assert_eq!(by_email.id, "acc-1");
        assert_eq!(by_name.id, "acc-1");
        assert!(resolve_identifier(&mut conn, "nobody").unwrap().is_none());
        assert!(resolve_identifier(&mut conn, "").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_reported() {
        let mut conn = setup_test_db();
        let now = current_timestamp();
        insert(&mut conn, &new_account("acc-1", "alice", None, "pearl:0x01", "CODE0001", &now)).unwrap();

        let dup = insert(&mut conn, &new_account("acc-2", "alice", None, "pearl:0x02", "CODE0002", &now)).unwrap();
        match dup {
            AccountInsert::Duplicate { field } => assert_eq!(field, "username"),
            other => panic!("expected duplicate, got {:?}", other),
        }
    }

    #[test]
    fn test_update_totals_is_compare_and_set() {
        let mut conn = setup_test_db();
        let now = current_timestamp();
        insert(&mut conn, &new_account("acc-1", "alice", None, "pearl:0x01", "CODE0001", &now)).unwrap();
        let read = find(&mut conn, "acc-1").unwrap().unwrap();

        assert_eq!(update_totals(&mut conn, &read, 1500, 100, 1).unwrap(), 1);
        // Stale read no longer matches
        assert_eq!(update_totals(&mut conn, &read, 2000, 100, 1).unwrap(), 0);

        let after = find(&mut conn, "acc-1").unwrap().unwrap();
        assert_eq!(after.balance, 1500);
        assert_eq!(after.experience, 100);
    }

    #[test]
    fn test_load_in_lock_order() {
        let mut conn = setup_test_db();
        let now = current_timestamp();
        insert(&mut conn, &new_account("b", "bob", None, "pearl:0x0b", "CODE000B", &now)).unwrap();
        insert(&mut conn, &new_account("a", "alice", None, "pearl:0x0a", "CODE000A", &now)).unwrap();

        let loaded = load_in_lock_order(&mut conn, &["b", "a"]).unwrap();
        let ids: Vec<&str> = loaded.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
