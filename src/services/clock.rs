//! Source of the current UTC calendar day
//!
//! Daily claims are keyed by the day this returns, never by a caller-supplied
//! date. Tests swap in a closure to move through days.

use chrono::{NaiveDate, Utc};

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall clock, UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

impl<F> Clock for F
where
    F: Fn() -> NaiveDate + Send + Sync,
{
    fn today(&self) -> NaiveDate {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_closure_clock_follows_its_state() {
        let day = Arc::new(AtomicU32::new(1));
        let clock: Arc<dyn Clock> = {
            let day = day.clone();
            Arc::new(move || NaiveDate::from_ymd_opt(2026, 3, day.load(Ordering::SeqCst)).unwrap())
        };

        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        day.store(4, Ordering::SeqCst);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 3, 4).unwrap());
    }

    #[test]
    fn test_system_clock_is_utc_today() {
        let before = Utc::now().date_naive();
        let today = SystemClock.today();
        assert!(today >= before);
    }
}
