//! Ad-gated speed-ups with a rolling per-category rate limit.
//!
//! The limit is a count of log entries in the trailing window. The count
//! shown to the client is display-only: every grant recounts under a lock
//! before logging, so concurrent requests cannot overshoot the limit.

use chrono::{DateTime, TimeDelta, Utc};

use hexfield_types::{SpeedUpCategory, SpeedUpEligibility};

use crate::config::SpeedUpConfig;
use crate::error::GameError;
use crate::scheduler;

/// Start of the rate-limit window ending at `now`.
pub fn window_start(now: DateTime<Utc>, config: &SpeedUpConfig) -> DateTime<Utc> {
    now.checked_sub_signed(TimeDelta::seconds(i64::from(config.window_seconds)))
        .unwrap_or(now)
}

/// Display view of the limit.
pub fn eligibility(category: SpeedUpCategory, used: u32, config: &SpeedUpConfig) -> SpeedUpEligibility {
    let limit = config.limit_for(category);
    SpeedUpEligibility {
        category,
        used,
        limit,
        remaining: limit.saturating_sub(used),
        window_seconds: config.window_seconds,
    }
}

/// Authorise one more speed-up. Returns how many remain after it.
pub fn authorize(category: SpeedUpCategory, used: u32, config: &SpeedUpConfig) -> Result<u32, GameError> {
    let limit = config.limit_for(category);
    if used >= limit {
        return Err(GameError::LimitReached {
            what: format!("{category} speed-up"),
            used,
            limit,
        });
    }
    Ok(limit.saturating_sub(used).saturating_sub(1))
}

/// New completion time after one speed-up.
pub fn apply(completes_at: DateTime<Utc>, now: DateTime<Utc>, config: &SpeedUpConfig) -> Result<DateTime<Utc>, GameError> {
    if completes_at <= now {
        return Err(GameError::terminal("task", "complete"));
    }
    Ok(scheduler::shorten(completes_at, now, config.seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_has_its_own_limit() {
        let config = SpeedUpConfig::default();
        assert_eq!(authorize(SpeedUpCategory::Factory, 2, &config).ok(), Some(0));
        assert!(matches!(
            authorize(SpeedUpCategory::Factory, 3, &config),
            Err(GameError::LimitReached { used: 3, limit: 3, .. })
        ));
        assert_eq!(authorize(SpeedUpCategory::Farm, 3, &config).ok(), Some(1));
    }

    #[test]
    fn eligibility_floors_remaining() {
        let config = SpeedUpConfig::default();
        let view = eligibility(SpeedUpCategory::Zoo, 9, &config);
        assert_eq!(view.remaining, 0);
        assert_eq!(view.limit, 5);
    }

    #[test]
    fn speed_up_floors_at_now() {
        let config = SpeedUpConfig::default();
        let now = Utc::now();
        let soon = now + TimeDelta::seconds(100);
        assert_eq!(apply(soon, now, &config).ok(), Some(now));
        let later = now + TimeDelta::seconds(1000);
        assert_eq!(apply(later, now, &config).ok(), Some(now + TimeDelta::seconds(700)));
    }

    #[test]
    fn finished_task_cannot_be_sped_up() {
        let config = SpeedUpConfig::default();
        let now = Utc::now();
        assert!(matches!(apply(now, now, &config), Err(GameError::AlreadyTerminal { .. })));
    }

    #[test]
    fn window_is_trailing() {
        let config = SpeedUpConfig::default();
        let now = Utc::now();
        assert_eq!(window_start(now, &config), now - TimeDelta::hours(1));
    }
}
