//! Daily streak rules
//!
//! A claim continues the streak only when the previous claim was exactly
//! yesterday. Position 7 completes the cycle and the next one starts at 1.

use chrono::NaiveDate;

/// Days in one reward cycle
pub const CYCLE_LENGTH: i32 = 7;

const CLAIM_KEY_FORMAT: &str = "%Y-%m-%d";

/// Claim key for a calendar date
pub fn claim_key(date: NaiveDate) -> String {
    date.format(CLAIM_KEY_FORMAT).to_string()
}

pub fn parse_claim_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, CLAIM_KEY_FORMAT).ok()
}

/// Streak position for a claim made on `today`
///
/// `prior` is the date and position of the most recent earlier claim.
pub fn next_streak(today: NaiveDate, prior: Option<(NaiveDate, i32)>) -> i32 {
    match prior {
        Some((date, position)) if today.pred_opt() == Some(date) => {
            if position >= CYCLE_LENGTH {
                1
            } else {
                position + 1
            }
        }
        _ => 1,
    }
}

/// Streak shown to the user on `today`
///
/// Still alive if the last claim was today or yesterday, otherwise 0.
pub fn current_streak(today: NaiveDate, prior: Option<(NaiveDate, i32)>) -> i32 {
    match prior {
        Some((date, position)) if date == today || today.pred_opt() == Some(date) => position,
        _ => 0,
    }
}
