//! Daily login rewards with a consecutive-day streak.

use chrono::{DateTime, NaiveDate, Utc};

use hexfield_ledger::ProgressionRules;
use hexfield_types::{Bundle, DailyRewardResult};

use crate::boosts::BoostSet;
use crate::config::{DailyReward, DailyRewardsConfig};
use crate::error::GameError;
use crate::state::PlayerState;

/// Persisted streak state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyStreak {
    /// UTC day of the last claim.
    pub last_claim: Option<NaiveDate>,
    /// Consecutive days claimed, ending at `last_claim`.
    pub streak: u32,
}

/// The streak after a claim on `today`. Same-day claims are rejected.
pub fn next_streak(current: DailyStreak, today: NaiveDate) -> Result<u32, GameError> {
    match current.last_claim {
        Some(last) if last == today => Err(GameError::terminal("today's daily reward", "claimed")),
        Some(last) if last.succ_opt() == Some(today) => Ok(current.streak.saturating_add(1).max(1)),
        _ => Ok(1),
    }
}

/// Reward for a streak day; the table repeats.
pub fn reward_for(streak: u32, config: &DailyRewardsConfig) -> Result<&DailyReward, GameError> {
    let len = u32::try_from(config.rewards.len()).unwrap_or(u32::MAX);
    streak
        .saturating_sub(1)
        .checked_rem(len)
        .and_then(|idx| usize::try_from(idx).ok())
        .and_then(|idx| config.rewards.get(idx))
        .ok_or_else(|| GameError::malformed("daily reward table", "empty"))
}

/// Claim today's reward and advance the streak.
pub fn claim(
    player: &mut PlayerState,
    streak: &mut DailyStreak,
    config: &DailyRewardsConfig,
    rules: &ProgressionRules,
    now: DateTime<Utc>,
) -> Result<DailyRewardResult, GameError> {
    let today = now.date_naive();
    let next = next_streak(*streak, today)?;
    let reward = reward_for(next, config)?;
    let bundle = Bundle {
        crystals: reward.crystals,
        gems: reward.gems,
        xp: reward.xp,
        ..Bundle::default()
    };
    let awarded = player.credit_bundle(&bundle, 0, &BoostSet::none(), rules)?;
    *streak = DailyStreak {
        last_claim: Some(today),
        streak: next,
    };
    Ok(DailyRewardResult {
        success: true,
        streak: next,
        awarded,
    })
}
