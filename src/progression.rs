//! Level curve
//!
//! Level `n` requires a cumulative experience threshold `T(n)`:
//!
//! ```text
//! T(1) = 0
//! T(k + 1) = T(k) + 1000 + (k - 1) * 500
//! ```
//!
//! so the marginal cost grows 1000, 1500, 2000, ... The closed form is
//! `T(n) = 1000 (n - 1) + 250 (n - 1)(n - 2)`.
//!
//! The level stored on an account is always recomputed from its total
//! experience with [`LevelCurve::level_for`]; the derived value wins over the
//! cached one, even when that means moving the level down.

use serde::{Deserialize, Serialize};

/// Experience needed to go from level 1 to level 2
pub const BASE_LEVEL_COST: i64 = 1000;

/// Increase of the marginal cost per level
pub const LEVEL_COST_STEP: i64 = 500;

/// Default level cap
pub const DEFAULT_MAX_LEVEL: i32 = 1000;

/// Step function from total experience to level number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelCurve {
    max_level: i32,
}

/// Where an experience total sits on the curve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: i32,
    pub experience: i64,
    pub current_level_threshold: i64,
    /// `None` at the level cap
    pub next_level_threshold: Option<i64>,
    /// Experience still missing for the next level, `None` at the cap
    pub experience_to_next: Option<i64>,
}

impl LevelCurve {
    /// Create a curve capped at `max_level` (clamped to at least 1)
    pub fn new(max_level: i32) -> Self {
        Self {
            max_level: max_level.max(1),
        }
    }

    pub fn max_level(&self) -> i32 {
        self.max_level
    }

    /// Cumulative experience required to reach `level`
    pub fn threshold(&self, level: i32) -> i64 {
        let steps = i64::from(level.clamp(1, self.max_level)) - 1;
        BASE_LEVEL_COST * steps + (LEVEL_COST_STEP / 2) * steps * (steps - 1).max(0)
    }

    /// Greatest level whose threshold does not exceed `total_experience`
    pub fn level_for(&self, total_experience: i64) -> i32 {
        if total_experience <= 0 {
            return 1;
        }

        // Binary search over the monotonic thresholds
        let (mut lo, mut hi) = (1, self.max_level);
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if self.threshold(mid) <= total_experience {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        lo
    }

    /// Level plus distance to the next one
    pub fn progress(&self, total_experience: i64) -> LevelProgress {
        let experience = total_experience.max(0);
        let level = self.level_for(experience);
        let next_level_threshold = if level < self.max_level {
            Some(self.threshold(level + 1))
        } else {
            None
        };

        LevelProgress {
            level,
            experience,
            current_level_threshold: self.threshold(level),
            next_level_threshold,
            experience_to_next: next_level_threshold.map(|t| t - experience),
        }
    }
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEVEL)
    }
}

/// Level for `total_experience` on the default curve
pub fn level_for(total_experience: i64) -> i32 {
    LevelCurve::default().level_for(total_experience)
}
