//! Covens: membership, invitations, the shared pool and collective tasks.
//!
//! Lock order inside this module is task, then coven, then the player's
//! coven scope. Invitation rows come before the coven they point at.
//! Contributors' ledgers are saved in id order.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use hexfield_engine::GameError;
use hexfield_engine::coven::{
    self, Contribution, Coven, CovenPool, CovenTask, Departure, Invitation, Membership, Objective, ObjectiveKind,
};
use hexfield_engine::progress::ProgressEvent;
use hexfield_engine::state::PlayerState;
use hexfield_types::{
    BalanceResult, Bundle, ConditionType, ContributionResult, CovenId, CovenRole, CovenTaskId, InvitationId,
    InvitationStatus, ItemKind, PlayerId,
};

use super::{Game, unique_as};
use crate::codec::{column, item_columns, item_from_columns, param};
use crate::effects::Effects;
use crate::error::DbError;
use crate::state::{self, Scope};
use crate::views::{CancelResult, CovenTaskView, CovenView, InvitationView, LeaveResult, MemberView, PoolLine};

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct CovenRow {
    id: Uuid,
    name: String,
    public: bool,
    member_count: i32,
    crystals: i64,
    gems: i64,
    created_at: DateTime<Utc>,
}

impl CovenRow {
    fn coven(&self) -> Coven {
        Coven {
            id: CovenId(self.id),
            name: self.name.clone(),
            public: self.public,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    coven_id: Uuid,
    player_id: Uuid,
    role: String,
    joined_at: DateTime<Utc>,
}

impl MemberRow {
    fn into_membership(self) -> Result<Membership, DbError> {
        Ok(Membership {
            coven_id: CovenId(self.coven_id),
            player: PlayerId(self.player_id),
            role: CovenRole::parse(&self.role)
                .ok_or_else(|| DbError::corrupt("coven_members", format!("unknown role {}", self.role)))?,
            joined_at: self.joined_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvitationRow {
    id: Uuid,
    coven_id: Uuid,
    inviter_id: Uuid,
    invitee_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl InvitationRow {
    fn into_invitation(self) -> Result<Invitation, DbError> {
        Ok(Invitation {
            id: InvitationId(self.id),
            coven_id: CovenId(self.coven_id),
            inviter: PlayerId(self.inviter_id),
            invitee: PlayerId(self.invitee_id),
            status: InvitationStatus::parse(&self.status)
                .ok_or_else(|| DbError::corrupt("coven_invitations", format!("unknown status {}", self.status)))?,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    coven_id: Uuid,
    title: String,
    objectives: Value,
    reward: Value,
    reward_points: i64,
    completed_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    fn into_task(self) -> Result<CovenTask, DbError> {
        Ok(CovenTask {
            id: CovenTaskId(self.id),
            coven_id: CovenId(self.coven_id),
            title: self.title,
            objectives: coven::parse_objectives(&self.objectives)
                .map_err(|e| DbError::corrupt("coven_tasks", e.to_string()))?,
            reward: Bundle::from_json(&self.reward).map_err(|e| DbError::corrupt("coven_tasks", e.0))?,
            reward_points: column(self.reward_points, "coven_tasks", "reward_points")?,
            completed_at: self.completed_at,
        })
    }
}

const COVEN_COLUMNS: &str = "id, name, public, member_count, crystals, gems, created_at";
const INVITATION_COLUMNS: &str = "id, coven_id, inviter_id, invitee_id, status, created_at, expires_at";
const TASK_COLUMNS: &str = "id, coven_id, title, objectives, reward, reward_points, completed_at";

// ---------------------------------------------------------------------------
// Loading and saving
// ---------------------------------------------------------------------------

async fn lock_coven(conn: &mut PgConnection, id: CovenId) -> Result<CovenRow, DbError> {
    Ok(sqlx::query_as::<_, CovenRow>(&format!("SELECT {COVEN_COLUMNS} FROM covens WHERE id = $1 FOR UPDATE"))
        .bind(id.into_inner())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| GameError::not_found("coven", id))?)
}

/// The caller's membership, if any. Unlocked; callers that act on it lock
/// the coven and re-read the member list.
async fn membership_of(conn: &mut PgConnection, player: PlayerId) -> Result<Option<Membership>, DbError> {
    sqlx::query_as::<_, MemberRow>("SELECT coven_id, player_id, role, joined_at FROM coven_members WHERE player_id = $1")
        .bind(player.into_inner())
        .fetch_optional(&mut *conn)
        .await?
        .map(MemberRow::into_membership)
        .transpose()
}

async fn require_membership(conn: &mut PgConnection, player: PlayerId) -> Result<Membership, DbError> {
    membership_of(conn, player)
        .await?
        .ok_or_else(|| GameError::NotPermitted("not a coven member".into()).into())
}

async fn load_members(conn: &mut PgConnection, coven: CovenId) -> Result<Vec<Membership>, DbError> {
    sqlx::query_as::<_, MemberRow>(
        "SELECT coven_id, player_id, role, joined_at FROM coven_members WHERE coven_id = $1 ORDER BY joined_at, player_id",
    )
    .bind(coven.into_inner())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(MemberRow::into_membership)
    .collect()
}

async fn is_member(conn: &mut PgConnection, coven: CovenId, player: PlayerId) -> Result<bool, DbError> {
    Ok(sqlx::query_scalar("SELECT is_coven_member($1, $2)")
        .bind(coven.into_inner())
        .bind(player.into_inner())
        .fetch_one(&mut *conn)
        .await?)
}

/// Re-check membership once the coven row is locked.
async fn ensure_member(conn: &mut PgConnection, coven: CovenId, player: PlayerId) -> Result<(), DbError> {
    if is_member(conn, coven, player).await? {
        Ok(())
    } else {
        Err(GameError::NotPermitted("not a coven member".into()).into())
    }
}

async fn insert_member(conn: &mut PgConnection, membership: &Membership) -> Result<(), DbError> {
    sqlx::query("INSERT INTO coven_members (coven_id, player_id, role, joined_at) VALUES ($1, $2, $3, $4)")
        .bind(membership.coven_id.into_inner())
        .bind(membership.player.into_inner())
        .bind(membership.role.as_str())
        .bind(membership.joined_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| unique_as(e, "already a member of a coven"))?;
    Ok(())
}

async fn set_role(conn: &mut PgConnection, coven: CovenId, player: PlayerId, role: CovenRole) -> Result<(), DbError> {
    sqlx::query("UPDATE coven_members SET role = $3 WHERE coven_id = $1 AND player_id = $2")
        .bind(coven.into_inner())
        .bind(player.into_inner())
        .bind(role.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn delete_member(conn: &mut PgConnection, coven: CovenId, player: PlayerId) -> Result<(), DbError> {
    sqlx::query("DELETE FROM coven_members WHERE coven_id = $1 AND player_id = $2")
        .bind(coven.into_inner())
        .bind(player.into_inner())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn load_pool(conn: &mut PgConnection, row: &CovenRow) -> Result<CovenPool, DbError> {
    let lines: Vec<(String, i32, i32, i64)> = sqlx::query_as(
        "SELECT item_category, item_base, item_level, quantity FROM coven_pool_items WHERE coven_id = $1",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;
    let mut items = BTreeMap::new();
    for (category, base, level, quantity) in lines {
        let item = item_from_columns("coven_pool_items", &category, base, level)?;
        items.insert(item, column(quantity, "coven_pool_items", "quantity")?);
    }
    Ok(CovenPool {
        crystals: column(row.crystals, "covens", "crystals")?,
        gems: column(row.gems, "covens", "gems")?,
        items,
    })
}

async fn save_pool(conn: &mut PgConnection, coven: CovenId, pool: &CovenPool) -> Result<(), DbError> {
    sqlx::query("UPDATE covens SET crystals = $2, gems = $3 WHERE id = $1")
        .bind(coven.into_inner())
        .bind(param::<_, i64>(pool.crystals, "coven crystals")?)
        .bind(param::<_, i64>(pool.gems, "coven gems")?)
        .execute(&mut *conn)
        .await?;
    for (item, quantity) in &pool.items {
        let (category, base, level) = item_columns(*item);
        sqlx::query(
            r"INSERT INTO coven_pool_items (coven_id, item_category, item_base, item_level, quantity)
              VALUES ($1, $2, $3, $4, $5)
              ON CONFLICT (coven_id, item_category, item_base, item_level) DO UPDATE SET quantity = EXCLUDED.quantity",
        )
        .bind(coven.into_inner())
        .bind(category)
        .bind(base)
        .bind(level)
        .bind(param::<_, i64>(*quantity, "coven item quantity")?)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn lock_invitation(conn: &mut PgConnection, id: InvitationId) -> Result<Invitation, DbError> {
    sqlx::query_as::<_, InvitationRow>(&format!(
        "SELECT {INVITATION_COLUMNS} FROM coven_invitations WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.into_inner())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| GameError::not_found("invitation", id))?
    .into_invitation()
}

async fn save_invitation_status(conn: &mut PgConnection, invitation: &Invitation) -> Result<(), DbError> {
    sqlx::query("UPDATE coven_invitations SET status = $2 WHERE id = $1")
        .bind(invitation.id.into_inner())
        .bind(invitation.status.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn lock_task(conn: &mut PgConnection, id: CovenTaskId) -> Result<CovenTask, DbError> {
    sqlx::query_as::<_, TaskRow>(&format!("SELECT {TASK_COLUMNS} FROM coven_tasks WHERE id = $1 FOR UPDATE"))
        .bind(id.into_inner())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| GameError::not_found("coven task", id))?
        .into_task()
}

async fn contributors(conn: &mut PgConnection, task: CovenTaskId) -> Result<BTreeSet<PlayerId>, DbError> {
    let ids: Vec<Uuid> = sqlx::query_scalar(
        "SELECT DISTINCT player_id FROM coven_task_contributions WHERE task_id = $1 AND quantity > 0",
    )
    .bind(task.into_inner())
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids.into_iter().map(PlayerId).collect())
}

const fn invitation_view(invitation: &Invitation) -> InvitationView {
    InvitationView {
        id: invitation.id,
        coven_id: invitation.coven_id,
        inviter: invitation.inviter,
        invitee: invitation.invitee,
        status: invitation.status,
        expires_at: invitation.expires_at,
    }
}

fn task_view(task: CovenTask) -> CovenTaskView {
    CovenTaskView {
        id: task.id,
        title: task.title,
        objectives: task.objectives,
        reward: task.reward.to_json(),
        reward_points: task.reward_points,
        completed_at: task.completed_at,
    }
}

fn coven_view(row: &CovenRow, pool: CovenPool, members: &[Membership]) -> Result<CovenView, DbError> {
    Ok(CovenView {
        id: CovenId(row.id),
        name: row.name.clone(),
        public: row.public,
        member_count: column(row.member_count, "covens", "member_count")?,
        crystals: pool.crystals,
        gems: pool.gems,
        items: pool
            .items
            .into_iter()
            .filter(|(_, quantity)| *quantity > 0)
            .map(|(item, quantity)| PoolLine { item, quantity })
            .collect(),
        members: members
            .iter()
            .map(|m| MemberView {
                player_id: m.player,
                role: m.role,
                joined_at: m.joined_at,
            })
            .collect(),
    })
}

impl Game {
    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Found a coven and become its leader.
    pub async fn create_coven(&self, player: PlayerId, name: &str, public: bool) -> Result<CovenView, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Coven).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let current = membership_of(&mut tx, player).await?.map(|m| m.coven_id);

        let (coven, membership) = coven::create(&mut state, name, public, current, &self.config.coven, now)?;
        sqlx::query("INSERT INTO covens (id, name, public, created_at) VALUES ($1, $2, $3, $4)")
            .bind(coven.id.into_inner())
            .bind(&coven.name)
            .bind(coven.public)
            .bind(coven.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| unique_as(e, "coven name is taken"))?;
        insert_member(&mut tx, &membership).await?;
        state::save_player(&mut tx, &state).await?;
        let row = lock_coven(&mut tx, coven.id).await?;
        let view = coven_view(&row, CovenPool::default(), &[membership])?;
        tx.commit().await?;
        Ok(view)
    }

    /// Join a public coven.
    pub async fn join_coven(&self, player: PlayerId, coven_id: CovenId) -> Result<CovenView, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let row = lock_coven(&mut tx, coven_id).await?;
        state::lock_scope(&mut tx, player, Scope::Coven).await?;
        let current = membership_of(&mut tx, player).await?.map(|m| m.coven_id);
        let count = column(row.member_count, "covens", "member_count")?;

        let membership = coven::join(&row.coven(), player, current, count, false, &self.config.coven, now)?;
        insert_member(&mut tx, &membership).await?;
        let view = self.coven_view_in(&mut tx, coven_id).await?;
        tx.commit().await?;

        tracing::info!(player = %player, coven = %coven_id, "joined coven");
        Ok(view)
    }

    /// Leave the caller's coven. A departing leader hands over to the
    /// longest-standing member; the last member out deletes the coven.
    pub async fn leave_coven(&self, player: PlayerId) -> Result<LeaveResult, DbError> {
        let mut tx = self.pool.begin().await?;
        let coven_id = require_membership(&mut tx, player).await?.coven_id;
        lock_coven(&mut tx, coven_id).await?;
        state::lock_scope(&mut tx, player, Scope::Coven).await?;
        ensure_member(&mut tx, coven_id, player).await?;
        let members = load_members(&mut tx, coven_id).await?;

        let departure = coven::leave(&members, player)?;
        delete_member(&mut tx, coven_id, player).await?;
        if let Departure::Succeeded(heir) = departure {
            set_role(&mut tx, coven_id, heir, CovenRole::Leader).await?;
        }
        tx.commit().await?;

        tracing::info!(player = %player, coven = %coven_id, ?departure, "left coven");
        Ok(LeaveResult {
            success: true,
            disbanded: departure == Departure::Disbanded,
            new_leader: match departure {
                Departure::Succeeded(heir) => Some(heir),
                Departure::Left | Departure::Disbanded => None,
            },
        })
    }

    /// Remove a member. Leader only.
    pub async fn kick_member(&self, leader: PlayerId, target: PlayerId) -> Result<CancelResult, DbError> {
        let mut tx = self.pool.begin().await?;
        let coven_id = require_membership(&mut tx, leader).await?.coven_id;
        lock_coven(&mut tx, coven_id).await?;
        ensure_member(&mut tx, coven_id, leader).await?;
        let members = load_members(&mut tx, coven_id).await?;
        coven::kick(&members, leader, target)?;
        delete_member(&mut tx, coven_id, target).await?;
        tx.commit().await?;

        tracing::info!(leader = %leader, target = %target, coven = %coven_id, "member kicked");
        Ok(CancelResult {
            success: true,
            cancelled: true,
        })
    }

    /// Hand leadership to another member. Leader only.
    pub async fn transfer_leadership(&self, leader: PlayerId, target: PlayerId) -> Result<CovenView, DbError> {
        let mut tx = self.pool.begin().await?;
        let coven_id = require_membership(&mut tx, leader).await?.coven_id;
        lock_coven(&mut tx, coven_id).await?;
        ensure_member(&mut tx, coven_id, leader).await?;
        let members = load_members(&mut tx, coven_id).await?;
        coven::transfer_leadership(&members, leader, target)?;
        // One leader per coven is enforced by a partial unique index, so
        // demote before promoting.
        set_role(&mut tx, coven_id, leader, CovenRole::Member).await?;
        set_role(&mut tx, coven_id, target, CovenRole::Leader).await?;
        let view = self.coven_view_in(&mut tx, coven_id).await?;
        tx.commit().await?;

        tracing::info!(from = %leader, to = %target, coven = %coven_id, "leadership transferred");
        Ok(view)
    }

    /// Whether `player` belongs to `coven_id`, via the shared SQL predicate.
    pub async fn is_coven_member(&self, coven_id: CovenId, player: PlayerId) -> Result<bool, DbError> {
        let mut conn = self.pool.acquire().await?;
        is_member(&mut conn, coven_id, player).await
    }

    /// The caller's coven. Members only.
    pub async fn get_coven(&self, player: PlayerId) -> Result<CovenView, DbError> {
        let mut conn = self.pool.acquire().await?;
        let coven_id = require_membership(&mut conn, player).await?.coven_id;
        self.coven_view_in(&mut conn, coven_id).await
    }

    async fn coven_view_in(&self, conn: &mut PgConnection, coven_id: CovenId) -> Result<CovenView, DbError> {
        let row = sqlx::query_as::<_, CovenRow>(&format!("SELECT {COVEN_COLUMNS} FROM covens WHERE id = $1"))
            .bind(coven_id.into_inner())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| GameError::not_found("coven", coven_id))?;
        let pool = load_pool(conn, &row).await?;
        let members = load_members(conn, coven_id).await?;
        coven_view(&row, pool, &members)
    }

    // -----------------------------------------------------------------------
    // Invitations
    // -----------------------------------------------------------------------

    /// Invite a player into the caller's coven. Any member may invite.
    pub async fn invite_to_coven(&self, player: PlayerId, invitee: PlayerId) -> Result<InvitationView, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let membership = require_membership(&mut tx, player).await?;
        // Lapsed pending rows would trip the one-pending index.
        sqlx::query(
            r"UPDATE coven_invitations SET status = 'cancelled'
              WHERE coven_id = $1 AND invitee_id = $2 AND status = 'pending' AND expires_at <= $3",
        )
        .bind(membership.coven_id.into_inner())
        .bind(invitee.into_inner())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        lock_coven(&mut tx, membership.coven_id).await?;
        let membership = load_members(&mut tx, membership.coven_id)
            .await?
            .into_iter()
            .find(|m| m.player == player)
            .ok_or_else(|| GameError::NotPermitted("not a coven member".into()))?;
        state::lock_scope(&mut tx, invitee, Scope::Coven).await?;
        let invitee_coven = membership_of(&mut tx, invitee).await?.map(|m| m.coven_id);
        let pending: bool = sqlx::query_scalar(
            r"SELECT EXISTS (SELECT 1 FROM coven_invitations
                             WHERE coven_id = $1 AND invitee_id = $2 AND status = 'pending')",
        )
        .bind(membership.coven_id.into_inner())
        .bind(invitee.into_inner())
        .fetch_one(&mut *tx)
        .await?;

        let invitation = coven::invite(&membership, invitee, invitee_coven, pending, &self.config.coven, now)?;
        sqlx::query(&format!(
            "INSERT INTO coven_invitations ({INVITATION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(invitation.id.into_inner())
        .bind(invitation.coven_id.into_inner())
        .bind(invitation.inviter.into_inner())
        .bind(invitation.invitee.into_inner())
        .bind(invitation.status.as_str())
        .bind(invitation.created_at)
        .bind(invitation.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_as(e, "an invitation is already pending"))?;
        tx.commit().await?;

        tracing::info!(inviter = %player, invitee = %invitee, coven = %invitation.coven_id, "invitation sent");
        Ok(invitation_view(&invitation))
    }

    /// Accept or decline an invitation addressed to the caller. Accepting
    /// joins the coven even when it is not public.
    pub async fn respond_to_invitation(
        &self,
        player: PlayerId,
        invitation_id: InvitationId,
        accept: bool,
    ) -> Result<InvitationView, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let mut invitation = lock_invitation(&mut tx, invitation_id).await?;
        coven::respond(&mut invitation, player, accept, now)?;

        if invitation.status == InvitationStatus::Accepted {
            let row = lock_coven(&mut tx, invitation.coven_id).await?;
            state::lock_scope(&mut tx, player, Scope::Coven).await?;
            let current = membership_of(&mut tx, player).await?.map(|m| m.coven_id);
            let count = column(row.member_count, "covens", "member_count")?;
            let membership = coven::join(&row.coven(), player, current, count, true, &self.config.coven, now)?;
            insert_member(&mut tx, &membership).await?;
        }
        save_invitation_status(&mut tx, &invitation).await?;
        tx.commit().await?;

        tracing::info!(player = %player, invitation = %invitation_id, status = %invitation.status, "invitation answered");
        Ok(invitation_view(&invitation))
    }

    /// Withdraw a pending invitation the caller sent.
    pub async fn cancel_invitation(&self, player: PlayerId, invitation_id: InvitationId) -> Result<InvitationView, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut invitation = lock_invitation(&mut tx, invitation_id).await?;
        coven::cancel_invitation(&mut invitation, player)?;
        save_invitation_status(&mut tx, &invitation).await?;
        tx.commit().await?;
        Ok(invitation_view(&invitation))
    }

    /// Live invitations addressed to the caller.
    pub async fn list_invitations(&self, player: PlayerId) -> Result<Vec<InvitationView>, DbError> {
        sqlx::query_as::<_, InvitationRow>(&format!(
            r"SELECT {INVITATION_COLUMNS} FROM coven_invitations
              WHERE invitee_id = $1 AND status = 'pending' AND expires_at > $2
              ORDER BY created_at"
        ))
        .bind(player.into_inner())
        .bind(self.now())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.into_invitation().map(|i| invitation_view(&i)))
        .collect()
    }

    // -----------------------------------------------------------------------
    // Pool
    // -----------------------------------------------------------------------

    /// Move crystals into the caller's coven pool.
    pub async fn donate_crystals(&self, player: PlayerId, amount: u64) -> Result<BalanceResult, DbError> {
        self.donate(player, |state, pool| coven::donate_crystals(state, pool, amount))
            .await
    }

    /// Move items into the caller's coven pool.
    pub async fn donate_items(&self, player: PlayerId, item: ItemKind, quantity: u32) -> Result<BalanceResult, DbError> {
        self.donate(player, |state, pool| coven::donate_items(state, pool, item, quantity))
            .await
    }

    async fn donate<F>(&self, player: PlayerId, rule: F) -> Result<BalanceResult, DbError>
    where
        F: FnOnce(&mut PlayerState, &mut CovenPool) -> Result<(), GameError>,
    {
        let mut tx = self.pool.begin().await?;
        let coven_id = require_membership(&mut tx, player).await?.coven_id;
        let row = lock_coven(&mut tx, coven_id).await?;
        ensure_member(&mut tx, coven_id, player).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let mut pool = load_pool(&mut tx, &row).await?;

        rule(&mut state, &mut pool)?;
        save_pool(&mut tx, coven_id, &pool).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(player = %player, coven = %coven_id, pool_crystals = pool.crystals, "donation made");
        Ok(BalanceResult {
            success: true,
            crystals: state.ledger.crystals,
            gems: state.ledger.gems,
            awarded: None,
        })
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Post a collective task. Leader only.
    pub async fn create_coven_task(
        &self,
        leader: PlayerId,
        title: &str,
        objectives: &[Objective],
        reward: Bundle,
        reward_points: u64,
    ) -> Result<CovenTaskView, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let coven_id = require_membership(&mut tx, leader).await?.coven_id;
        lock_coven(&mut tx, coven_id).await?;
        ensure_member(&mut tx, coven_id, leader).await?;
        let members = load_members(&mut tx, coven_id).await?;
        coven::ensure_leader(members.iter().find(|m| m.player == leader))?;

        let task = coven::create_task(coven_id, title, objectives, reward, reward_points)?;
        sqlx::query(
            r"INSERT INTO coven_tasks (id, coven_id, title, objectives, reward, reward_points, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(task.id.into_inner())
        .bind(coven_id.into_inner())
        .bind(&task.title)
        .bind(serde_json::to_value(&task.objectives)?)
        .bind(task.reward.to_json())
        .bind(param::<_, i64>(task.reward_points, "reward points")?)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(leader = %leader, coven = %coven_id, task = %task.id, "coven task created");
        Ok(task_view(task))
    }

    /// Hand in items toward a `deliver` objective. Only the units the
    /// objective still needed are debited.
    pub async fn contribute_to_task(
        &self,
        player: PlayerId,
        task_id: CovenTaskId,
        item: ItemKind,
        quantity: u32,
    ) -> Result<ContributionResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let mut task = self.open_member_task(&mut tx, player, task_id).await?;

        let preview = coven::contribute(&mut task.clone(), ObjectiveKind::Deliver, item, quantity, now)?;
        let mut states = self.load_contributors(&mut tx, player, task_id, preview).await?;
        let contribution = {
            let me = states
                .get_mut(&player)
                .ok_or_else(|| GameError::not_found("player", player))?;
            coven::deliver(me, &mut task, item, quantity, now)?
        };
        let xp = self
            .record_contribution(&mut tx, player, &task, contribution, &mut states)
            .await?;
        state::save_players(&mut tx, &states).await?;
        tx.commit().await?;

        tracing::info!(
            player = %player,
            task = %task_id,
            counted = contribution.counted,
            completed = contribution.completed,
            "coven task contribution"
        );
        let mut effects = Effects::new();
        effects.event(ProgressEvent {
            condition: ConditionType::Contribute,
            item: Some(item),
            amount: u64::from(contribution.counted),
        });
        self.fan_out(player, effects).await;
        Ok(ContributionResult {
            success: true,
            contributed: contribution.counted,
            task_completed: contribution.completed,
            xp_per_contributor: xp,
        })
    }

    /// Offer freshly collected items to the open `produce` objectives of
    /// the player's coven, oldest task first. Each task is advanced in its
    /// own transaction. Returns the units counted.
    pub(crate) async fn contribute_produced(&self, player: PlayerId, item: ItemKind, quantity: u32) -> Result<u32, DbError> {
        let coven_id = {
            let mut conn = self.pool.acquire().await?;
            match membership_of(&mut conn, player).await? {
                Some(m) => m.coven_id,
                None => return Ok(0),
            }
        };
        let candidates: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM coven_tasks WHERE coven_id = $1 AND completed_at IS NULL ORDER BY created_at, id",
        )
        .bind(coven_id.into_inner())
        .fetch_all(&self.pool)
        .await?;

        let mut left = quantity;
        for task_id in candidates.into_iter().map(CovenTaskId) {
            if left == 0 {
                break;
            }
            let now = self.now();
            let mut tx = self.pool.begin().await?;
            let mut task = match self.open_member_task(&mut tx, player, task_id).await {
                Ok(task) => task,
                Err(DbError::Game(_)) => continue,
                Err(err) => return Err(err),
            };
            let preview = match coven::contribute(&mut task.clone(), ObjectiveKind::Produce, item, left, now) {
                Ok(preview) => preview,
                Err(_) => continue,
            };
            let mut states = self.load_contributors(&mut tx, player, task_id, preview).await?;
            let contribution = coven::contribute(&mut task, ObjectiveKind::Produce, item, left, now)?;
            self.record_contribution(&mut tx, player, &task, contribution, &mut states)
                .await?;
            state::save_players(&mut tx, &states).await?;
            tx.commit().await?;

            tracing::debug!(player = %player, task = %task_id, counted = contribution.counted, "produce auto-contributed");
            left = left.saturating_sub(contribution.counted);
        }
        Ok(quantity.saturating_sub(left))
    }

    /// Lock an open task and its coven, and check the caller belongs to it.
    async fn open_member_task(
        &self,
        conn: &mut PgConnection,
        player: PlayerId,
        task_id: CovenTaskId,
    ) -> Result<CovenTask, DbError> {
        let task = lock_task(conn, task_id).await?;
        lock_coven(conn, task.coven_id).await?;
        if !is_member(conn, task.coven_id, player).await? {
            return Err(GameError::not_found("coven task", task_id).into());
        }
        Ok(task)
    }

    /// Load the caller, plus every earlier contributor when `preview` says
    /// this contribution completes the task and XP will be split.
    async fn load_contributors(
        &self,
        conn: &mut PgConnection,
        player: PlayerId,
        task_id: CovenTaskId,
        preview: Contribution,
    ) -> Result<BTreeMap<PlayerId, PlayerState>, DbError> {
        let mut ids = BTreeSet::from([player]);
        if preview.completed {
            ids.extend(contributors(conn, task_id).await?);
        }
        state::load_players(conn, ids).await
    }

    /// Write a counted contribution and the task's progress. On completion
    /// credit the pool and split the XP among every contributor.
    async fn record_contribution(
        &self,
        conn: &mut PgConnection,
        player: PlayerId,
        task: &CovenTask,
        contribution: Contribution,
        states: &mut BTreeMap<PlayerId, PlayerState>,
    ) -> Result<Option<u64>, DbError> {
        sqlx::query(
            r"INSERT INTO coven_task_contributions (task_id, player_id, objective_index, quantity)
              VALUES ($1, $2, $3, $4)
              ON CONFLICT (task_id, player_id, objective_index)
              DO UPDATE SET quantity = coven_task_contributions.quantity + EXCLUDED.quantity",
        )
        .bind(task.id.into_inner())
        .bind(player.into_inner())
        .bind(param::<_, i32>(contribution.objective, "objective index")?)
        .bind(i64::from(contribution.counted))
        .execute(&mut *conn)
        .await?;
        sqlx::query("UPDATE coven_tasks SET objectives = $2, completed_at = $3 WHERE id = $1")
            .bind(task.id.into_inner())
            .bind(serde_json::to_value(&task.objectives)?)
            .bind(task.completed_at)
            .execute(&mut *conn)
            .await?;
        if !contribution.completed {
            return Ok(None);
        }

        let row = lock_coven(conn, task.coven_id).await?;
        let mut pool = load_pool(conn, &row).await?;
        pool.credit(&task.reward)?;
        save_pool(conn, task.coven_id, &pool).await?;

        let everyone = contributors(conn, task.id).await?;
        let xp = coven::split_xp(task.reward_points, everyone.len(), &self.config.coven);
        for id in &everyone {
            let state = states
                .get_mut(id)
                .ok_or_else(|| DbError::corrupt("coven_task_contributions", format!("contributor {id} not loaded")))?;
            state.grant_xp(xp, &self.config.progression)?;
        }
        tracing::info!(task = %task.id, coven = %task.coven_id, contributors = everyone.len(), xp, "coven task completed");
        Ok(Some(xp))
    }

    /// Tasks of the caller's coven, open ones first.
    pub async fn list_coven_tasks(&self, player: PlayerId) -> Result<Vec<CovenTaskView>, DbError> {
        let mut conn = self.pool.acquire().await?;
        let coven_id = require_membership(&mut conn, player).await?.coven_id;
        sqlx::query_as::<_, TaskRow>(&format!(
            r"SELECT {TASK_COLUMNS} FROM coven_tasks WHERE coven_id = $1
              ORDER BY completed_at IS NOT NULL, created_at DESC"
        ))
        .bind(coven_id.into_inner())
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|row| row.into_task().map(task_view))
        .collect()
    }
}
