//! Friend graph and help actions.
//!
//! A friendship is stored as two mirrored rows, one per direction, so each
//! player's friend list is a scan of rows they own. Both rows move between
//! states together.
//!
//! Help actions mutate the friend's scheduler state. The accepted
//! relationship is re-checked on every call by the persistence layer before
//! any of these rules run; nothing here trusts an earlier check.

use chrono::{DateTime, NaiveTime, Utc};

use hexfield_types::{FriendStatus, HelpAction, PlayerId};

use crate::config::SocialConfig;
use crate::error::GameError;
use crate::scheduler;

/// One direction of a friendship as seen by `player`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Friendship {
    /// Row owner.
    pub player: PlayerId,
    /// The other side.
    pub friend: PlayerId,
    /// Pending or accepted.
    pub status: FriendStatus,
    /// Who sent the request.
    pub requested_by: PlayerId,
    /// When the request was sent.
    pub created_at: DateTime<Utc>,
}

impl Friendship {
    /// The two mirrored pending rows for a new request.
    pub fn request_pair(sender: PlayerId, target: PlayerId, now: DateTime<Utc>) -> [Self; 2] {
        let row = |player, friend| Self {
            player,
            friend,
            status: FriendStatus::Pending,
            requested_by: sender,
            created_at: now,
        };
        [row(sender, target), row(target, sender)]
    }
}

/// Check a new friend request.
pub fn validate_request(
    sender: PlayerId,
    target: PlayerId,
    existing: Option<FriendStatus>,
    sender_friends: u32,
    target_friends: u32,
    config: &SocialConfig,
) -> Result<(), GameError> {
    if sender == target {
        return Err(GameError::Invalid("cannot befriend yourself".into()));
    }
    match existing {
        Some(FriendStatus::Accepted) => {
            return Err(GameError::terminal(format!("player {target}"), "a friend"));
        }
        Some(FriendStatus::Pending) => {
            return Err(GameError::terminal(format!("friend request to {target}"), "pending"));
        }
        None => {}
    }
    for used in [sender_friends, target_friends] {
        if used >= config.max_friends {
            return Err(GameError::LimitReached {
                what: "friend".into(),
                used,
                limit: config.max_friends,
            });
        }
    }
    Ok(())
}

/// Check that `me` may accept or decline the request `row` describes.
/// Only the recipient of a pending request can answer it.
pub fn validate_response(me: PlayerId, row: Option<&Friendship>) -> Result<Friendship, GameError> {
    let row = row
        .copied()
        .filter(|r| r.player == me)
        .ok_or_else(|| GameError::not_found("friend request", me))?;
    if row.status == FriendStatus::Accepted {
        return Err(GameError::terminal(format!("friend request from {}", row.friend), "accepted"));
    }
    if row.requested_by == me {
        return Err(GameError::NotPermitted("only the recipient can answer a friend request".into()));
    }
    Ok(row)
}

/// Require an accepted friendship.
pub fn ensure_friends(helper: PlayerId, friend: PlayerId, status: Option<FriendStatus>) -> Result<(), GameError> {
    if helper == friend {
        return Err(GameError::Invalid("cannot help yourself".into()));
    }
    match status {
        Some(FriendStatus::Accepted) => Ok(()),
        _ => Err(GameError::NotPermitted(format!("{friend} is not your friend"))),
    }
}

/// Start of the UTC day containing `now`; the help limit resets there.
pub fn help_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Require that the helper has help actions left for this friend today.
pub fn ensure_help_allowed(helps_today: u32, config: &SocialConfig) -> Result<(), GameError> {
    if helps_today >= config.helps_per_friend_per_day {
        return Err(GameError::LimitReached {
            what: "daily help for this friend".into(),
            used: helps_today,
            limit: config.helps_per_friend_per_day,
        });
    }
    Ok(())
}

/// New completion time of a friend's task after one help.
pub fn help_completion(
    action: HelpAction,
    completes_at: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &SocialConfig,
) -> Result<DateTime<Utc>, GameError> {
    if completes_at <= now {
        return Err(GameError::terminal(format!("{action} task"), "ready"));
    }
    Ok(scheduler::shorten(completes_at, now, config.help_seconds))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    #[test]
    fn request_creates_mirrored_rows() {
        let a = PlayerId::new();
        let b = PlayerId::new();
        let [mine, theirs] = Friendship::request_pair(a, b, Utc::now());
        assert_eq!((mine.player, mine.friend), (a, b));
        assert_eq!((theirs.player, theirs.friend), (b, a));
        assert_eq!(theirs.requested_by, a);
    }

    #[test]
    fn request_rules() {
        let config = SocialConfig::default();
        let a = PlayerId::new();
        let b = PlayerId::new();
        assert!(matches!(
            validate_request(a, a, None, 0, 0, &config),
            Err(GameError::Invalid(_))
        ));
        assert!(matches!(
            validate_request(a, b, Some(FriendStatus::Pending), 0, 0, &config),
            Err(GameError::AlreadyTerminal { .. })
        ));
        assert!(matches!(
            validate_request(a, b, None, 0, 100, &config),
            Err(GameError::LimitReached { .. })
        ));
        assert!(validate_request(a, b, None, 3, 4, &config).is_ok());
    }

    #[test]
    fn only_recipient_answers() {
        let a = PlayerId::new();
        let b = PlayerId::new();
        let [sender_row, recipient_row] = Friendship::request_pair(a, b, Utc::now());
        assert!(matches!(
            validate_response(a, Some(&sender_row)),
            Err(GameError::NotPermitted(_))
        ));
        assert!(validate_response(b, Some(&recipient_row)).is_ok());
        assert!(matches!(validate_response(b, None), Err(GameError::NotFound { .. })));
    }

    #[test]
    fn helping_requires_accepted_friendship() {
        let a = PlayerId::new();
        let b = PlayerId::new();
        assert!(ensure_friends(a, b, Some(FriendStatus::Accepted)).is_ok());
        assert!(ensure_friends(a, b, Some(FriendStatus::Pending)).is_err());
        assert!(ensure_friends(a, b, None).is_err());
    }

    #[test]
    fn help_shortens_and_is_limited() {
        let config = SocialConfig::default();
        let now = Utc::now();
        let due = now + TimeDelta::seconds(1000);
        assert_eq!(
            help_completion(HelpAction::Crop, due, now, &config).ok(),
            Some(now + TimeDelta::seconds(400))
        );
        assert!(help_completion(HelpAction::Crop, now, now, &config).is_err());
        assert!(ensure_help_allowed(2, &config).is_ok());
        assert!(ensure_help_allowed(3, &config).is_err());
    }

    #[test]
    fn help_day_is_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 17, 30, 0).single().unwrap_or_default();
        let start = Utc.with_ymd_and_hms(2026, 5, 4, 0, 0, 0).single().unwrap_or_default();
        assert_eq!(help_day_start(now), start);
    }
}
