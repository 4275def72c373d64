//! Regattas: time-boxed competitive events.
//!
//! Participants join, submit each regatta task at most once while the
//! window is open, and accumulate points. After the window closes the
//! regatta is settled exactly once: participants with points are ranked by
//! points (ties broken by who joined first) and each rank falls into the
//! first configured tier whose `top_fraction` covers `rank / n`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use hexfield_types::{Bundle, PlayerId, RegattaId, RewardTier, SettlementResult};

use crate::catalog::RegattaTask;
use crate::config::{RegattaConfig, TierConfig};
use crate::error::GameError;
use crate::state::PlayerState;

/// A regatta event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regatta {
    /// Identifier.
    pub id: RegattaId,
    /// Display name.
    pub name: String,
    /// Window opens.
    pub starts_at: DateTime<Utc>,
    /// Window closes.
    pub ends_at: DateTime<Utc>,
    /// Set by the one settlement that ran.
    pub settled_at: Option<DateTime<Utc>>,
}

/// A player's entry in a regatta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    /// Participant.
    pub player: PlayerId,
    /// Points so far.
    pub points: u64,
    /// Join time; breaks ties.
    pub joined_at: DateTime<Utc>,
}

/// A ranked participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    /// Participant.
    pub player: PlayerId,
    /// Final or current points.
    pub points: u64,
    /// 1-based rank.
    pub rank: u32,
}

/// Require the submission window to be open.
pub fn ensure_open(regatta: &Regatta, now: DateTime<Utc>) -> Result<(), GameError> {
    if now < regatta.starts_at {
        return Err(GameError::Precondition(format!(
            "{} opens at {}",
            regatta.name, regatta.starts_at
        )));
    }
    if now >= regatta.ends_at {
        return Err(GameError::Precondition(format!("{} closed at {}", regatta.name, regatta.ends_at)));
    }
    Ok(())
}

/// Enter a regatta.
pub fn join(
    regatta: &Regatta,
    player: PlayerId,
    already_joined: bool,
    now: DateTime<Utc>,
) -> Result<Participant, GameError> {
    if already_joined {
        return Err(GameError::terminal(format!("entry in {}", regatta.name), "registered"));
    }
    ensure_open(regatta, now)?;
    Ok(Participant {
        player,
        points: 0,
        joined_at: now,
    })
}

/// Deliver a regatta task's requirements and bank its points.
pub fn submit(
    player: &mut PlayerState,
    regatta: &Regatta,
    participant: &mut Participant,
    task: &RegattaTask,
    already_submitted: bool,
    now: DateTime<Utc>,
) -> Result<u64, GameError> {
    ensure_open(regatta, now)?;
    if already_submitted {
        return Err(GameError::terminal(format!("regatta task {}", task.id), "submitted"));
    }
    player.debit_items(&task.requirements)?;
    participant.points = participant
        .points
        .checked_add(task.points)
        .ok_or_else(|| GameError::overflow("regatta points"))?;
    tracing::info!(
        player = %participant.player,
        regatta = %regatta.id,
        task = %task.id,
        points = participant.points,
        "regatta task submitted"
    );
    Ok(participant.points)
}

/// Rank participants with at least one point.
pub fn rank(participants: &[Participant]) -> Vec<Standing> {
    let mut scoring: Vec<&Participant> = participants.iter().filter(|p| p.points > 0).collect();
    scoring.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(a.joined_at.cmp(&b.joined_at))
            .then(a.player.cmp(&b.player))
    });
    scoring
        .into_iter()
        .zip(1_u32..)
        .map(|(p, rank)| Standing {
            player: p.player,
            points: p.points,
            rank,
        })
        .collect()
}

/// The tier a rank falls into among `n` ranked participants.
pub fn tier_for(rank: u32, n: u32, tiers: &[TierConfig]) -> Option<&TierConfig> {
    let percentile = Decimal::from(rank).checked_div(Decimal::from(n))?;
    tiers.iter().find(|t| percentile <= t.top_fraction)
}

/// One participant's settlement reward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierAward {
    /// Recipient.
    pub player: PlayerId,
    /// Tier reached.
    pub tier: RewardTier,
    /// Credited to the recipient's ledger.
    pub reward: Bundle,
}

/// Outcome of [`settle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Payload for the caller.
    pub result: SettlementResult,
    /// Rewards to credit; empty when an earlier call settled.
    pub awards: Vec<TierAward>,
}

/// Settle a closed regatta. A second call is a successful no-op.
pub fn settle(
    regatta: &mut Regatta,
    participants: &[Participant],
    config: &RegattaConfig,
    now: DateTime<Utc>,
) -> Result<Settlement, GameError> {
    if regatta.settled_at.is_some() {
        return Ok(Settlement {
            result: SettlementResult {
                success: true,
                settled_now: false,
                participants: 0,
                tiers: BTreeMap::new(),
            },
            awards: Vec::new(),
        });
    }
    if now < regatta.ends_at {
        return Err(GameError::Precondition(format!(
            "{} is still running until {}",
            regatta.name, regatta.ends_at
        )));
    }
    let standings = rank(participants);
    let n = u32::try_from(standings.len()).unwrap_or(u32::MAX);
    let mut tiers: BTreeMap<RewardTier, u32> = BTreeMap::new();
    let mut awards = Vec::with_capacity(standings.len());
    for standing in &standings {
        let Some(tier) = tier_for(standing.rank, n, &config.tiers) else {
            continue;
        };
        let count = tiers.entry(tier.tier).or_insert(0);
        *count = count.saturating_add(1);
        awards.push(TierAward {
            player: standing.player,
            tier: tier.tier,
            reward: Bundle {
                crystals: tier.crystals,
                gems: tier.gems,
                xp: tier.xp,
                items: BTreeMap::new(),
            },
        });
    }
    regatta.settled_at = Some(now);
    tracing::info!(regatta = %regatta.id, participants = n, "regatta settled");
    Ok(Settlement {
        result: SettlementResult {
            success: true,
            settled_now: true,
            participants: n,
            tiers,
        },
        awards,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;
    use hexfield_ledger::{Inventory, PlayerLedger};
    use hexfield_types::{ItemKind, RegattaTaskId};

    use super::*;

    fn regatta(now: DateTime<Utc>) -> Regatta {
        Regatta {
            id: RegattaId::new(),
            name: "Spring Regatta".into(),
            starts_at: now - TimeDelta::hours(1),
            ends_at: now + TimeDelta::hours(1),
            settled_at: None,
        }
    }

    fn participant(points: u64, joined_minutes_ago: i64) -> Participant {
        Participant {
            player: PlayerId::new(),
            points,
            joined_at: Utc::now() - TimeDelta::minutes(joined_minutes_ago),
        }
    }

    #[test]
    fn submission_debits_and_scores_once() {
        let now = Utc::now();
        let r = regatta(now);
        let id = PlayerId::new();
        let mut player = PlayerState::new(
            PlayerLedger::new(id, 0, 0),
            Inventory::from_lines(id, [(ItemKind::Craftable(3), 5)]),
        );
        let task = RegattaTask {
            id: RegattaTaskId(1),
            requirements: BTreeMap::from([(ItemKind::Craftable(3), 2)]),
            points: 40,
        };
        let mut entry = join(&r, id, false, now).unwrap();
        assert_eq!(submit(&mut player, &r, &mut entry, &task, false, now).ok(), Some(40));
        assert_eq!(player.inventory.quantity(ItemKind::Craftable(3)), 3);
        assert!(matches!(
            submit(&mut player, &r, &mut entry, &task, true, now),
            Err(GameError::AlreadyTerminal { .. })
        ));
        assert!(submit(&mut player, &r, &mut entry, &task, false, r.ends_at).is_err());
    }

    #[test]
    fn ties_go_to_the_earlier_joiner() {
        let early = participant(50, 30);
        let late = participant(50, 10);
        let leader = participant(90, 5);
        let idle = participant(0, 60);
        let standings = rank(&[late, idle, early, leader]);
        let order: Vec<PlayerId> = standings.iter().map(|s| s.player).collect();
        assert_eq!(order, vec![leader.player, early.player, late.player]);
        assert_eq!(standings.last().map(|s| s.rank), Some(3));
    }

    #[test]
    fn tiers_by_percentile() {
        let config = RegattaConfig::default();
        let tier = |rank| tier_for(rank, 10, &config.tiers).map(|t| t.tier);
        assert_eq!(tier(1), Some(RewardTier::Gold));
        assert_eq!(tier(2), Some(RewardTier::Silver));
        assert_eq!(tier(3), Some(RewardTier::Silver));
        assert_eq!(tier(6), Some(RewardTier::Bronze));
        assert_eq!(tier(7), Some(RewardTier::Participation));
    }

    #[test]
    fn settlement_is_idempotent() {
        let now = Utc::now();
        let mut r = regatta(now);
        let config = RegattaConfig::default();
        let entries: Vec<Participant> = (1..=10).map(|i| participant(i * 10, i.cast_signed())).collect();
        assert!(matches!(
            settle(&mut r, &entries, &config, now),
            Err(GameError::Precondition(_))
        ));
        let after = r.ends_at;
        let first = settle(&mut r, &entries, &config, after);
        let first = first.unwrap();
        assert!(first.result.settled_now);
        assert_eq!(first.awards.len(), 10);
        assert_eq!(first.result.tiers.get(&RewardTier::Gold).copied(), Some(1));
        let second = settle(&mut r, &entries, &config, after);
        assert_eq!(second.map(|s| (s.result.settled_now, s.awards.len())).ok(), Some((false, 0)));
    }
}
