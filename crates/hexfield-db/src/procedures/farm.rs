//! Farm plots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use hexfield_engine::GameError;
use hexfield_engine::farm::{self, GrowingCrop, Plot};
use hexfield_engine::scheduler;
use hexfield_types::{
    CollectResult, ConditionType, CropId, PlayerId, SpeedUpCategory, SpeedUpResult, StartResult,
};

use super::Game;
use crate::codec::column;
use crate::effects::Effects;
use crate::error::DbError;
use crate::state;
use crate::views::PlotView;

#[derive(Debug, sqlx::FromRow)]
struct PlotRow {
    plot_index: i32,
    level: i32,
    crop_id: Option<i32>,
    planted_at: Option<DateTime<Utc>>,
    ready_at: Option<DateTime<Utc>>,
}

impl PlotRow {
    fn into_plot(self) -> Result<Plot, DbError> {
        let index: u16 = column(self.plot_index, "farm_plots", "plot_index")?;
        let crop = match (self.crop_id, self.ready_at) {
            (Some(crop_id), Some(ready_at)) => Some(GrowingCrop {
                plot_index: index,
                crop_id: CropId(crop_id),
                planted_at: self.planted_at.unwrap_or(ready_at),
                ready_at,
            }),
            (None, None) => None,
            _ => return Err(DbError::corrupt("farm_plots", "crop and ready time must be set together")),
        };
        Ok(Plot {
            index,
            level: column(self.level, "farm_plots", "level")?,
            crop,
        })
    }
}

const PLOT_COLUMNS: &str = "plot_index, level, crop_id, planted_at, ready_at";

/// Lock one of `player`'s plots.
pub(super) async fn lock_plot(conn: &mut PgConnection, player: PlayerId, index: u16) -> Result<Plot, DbError> {
    sqlx::query_as::<_, PlotRow>(&format!(
        "SELECT {PLOT_COLUMNS} FROM farm_plots WHERE player_id = $1 AND plot_index = $2 FOR UPDATE"
    ))
    .bind(player.into_inner())
    .bind(i32::from(index))
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| GameError::not_found("farm plot", index))?
    .into_plot()
}

/// Write a plot's growing crop (or its absence) back.
pub(super) async fn save_plot(
    conn: &mut PgConnection,
    player: PlayerId,
    index: u16,
    crop: Option<&GrowingCrop>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE farm_plots SET crop_id = $3, planted_at = $4, ready_at = $5 WHERE player_id = $1 AND plot_index = $2",
    )
    .bind(player.into_inner())
    .bind(i32::from(index))
    .bind(crop.map(|c| c.crop_id.get()))
    .bind(crop.map(|c| c.planted_at))
    .bind(crop.map(|c| c.ready_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Game {
    /// Plant one seed of `crop_id` on an empty plot.
    pub async fn plant_crop(&self, player: PlayerId, plot_index: u16, crop_id: CropId) -> Result<StartResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let plot = lock_plot(&mut tx, player, plot_index).await?;
        let mut state = state::load_player(&mut tx, player).await?;

        let crop = self.catalog.crops.get(&crop_id);
        let (growing, times) = farm::plant(&mut state, &plot, crop, &self.config, now)?;
        save_plot(&mut tx, player, plot_index, Some(&growing)).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        let seed = crop.map(|c| c.seed_item()).transpose()?;
        let consumed: BTreeMap<_, _> = seed.into_iter().map(|s| (s, 1)).collect();
        Ok(scheduler::start_result(times, Some(plot_index), &consumed))
    }

    /// Harvest a ripe crop. An empty plot is a successful no-op.
    pub async fn harvest_crop(&self, player: PlayerId, plot_index: u16) -> Result<CollectResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let plot = lock_plot(&mut tx, player, plot_index).await?;
        let Some(growing) = plot.crop else {
            tracing::debug!(player = %player, plot = plot_index, "nothing to harvest");
            return Ok(CollectResult::nothing_to_collect());
        };
        let crop = self
            .catalog
            .crops
            .get(&growing.crop_id)
            .ok_or_else(|| DbError::corrupt("farm_plots", format!("unknown crop {}", growing.crop_id)))?;

        let mut state = state::load_player(&mut tx, player).await?;
        let boosts = state::load_boosts(&mut tx, player, now).await?;
        let awarded = farm::harvest(
            &mut state,
            &growing,
            crop,
            &self.catalog.item_values,
            &boosts,
            &self.config,
            now,
        )?;
        save_plot(&mut tx, player, plot_index, None).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        let mut effects = Effects::new();
        effects.awarded(ConditionType::Harvest, &awarded).produced(&awarded);
        self.fan_out(player, effects).await;
        Ok(CollectResult::collected(awarded))
    }

    /// Shorten a growing crop. Rate-limited under the `farm` category.
    pub async fn speed_up_crop(&self, player: PlayerId, plot_index: u16) -> Result<SpeedUpResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let plot = lock_plot(&mut tx, player, plot_index).await?;
        let mut growing = plot
            .crop
            .ok_or_else(|| GameError::Precondition(format!("plot {plot_index} has nothing growing")))?;

        let result = self
            .grant_speed_up(&mut tx, player, SpeedUpCategory::Farm, growing.ready_at, now)
            .await?;
        growing.ready_at = result.completes_at;
        save_plot(&mut tx, player, plot_index, Some(&growing)).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// The caller's plots in index order.
    pub async fn get_farm(&self, player: PlayerId) -> Result<Vec<PlotView>, DbError> {
        let rows = sqlx::query_as::<_, PlotRow>(&format!(
            "SELECT {PLOT_COLUMNS} FROM farm_plots WHERE player_id = $1 ORDER BY plot_index"
        ))
        .bind(player.into_inner())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let plot = row.into_plot()?;
                Ok(PlotView {
                    plot_index: plot.index,
                    level: plot.level,
                    crop_id: plot.crop.map(|c| c.crop_id),
                    planted_at: plot.crop.map(|c| c.planted_at),
                    ready_at: plot.crop.map(|c| c.ready_at),
                })
            })
            .collect()
    }
}
