//! SQLite implementation of the CheckpointStore.

use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Checkpoint, CheckpointSummary, RunState};
use crate::domain::ports::CheckpointStore;

/// [`CheckpointStore`] backed by the `checkpoints` table.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Decode a stored payload. Never falls back to partial data.
    fn decode(id: &str, payload: &str) -> DomainResult<Checkpoint> {
        let corrupt = |reason: String| DomainError::CorruptCheckpoint {
            checkpoint_id: id.to_string(),
            reason,
        };
        let checkpoint: Checkpoint =
            serde_json::from_str(payload).map_err(|e| corrupt(e.to_string()))?;
        if checkpoint.checkpoint_id.to_string() != id {
            return Err(corrupt(format!(
                "payload belongs to checkpoint {}",
                checkpoint.checkpoint_id
            )));
        }
        Ok(checkpoint)
    }
}

#[derive(sqlx::FromRow)]
struct PayloadRow {
    id: String,
    payload_json: String,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: String,
    run_id: String,
    sequence: i64,
    state: String,
    round_index: i64,
    last_quality: Option<f64>,
    created_at: String,
}

impl TryFrom<SummaryRow> for CheckpointSummary {
    type Error = DomainError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        let state = RunState::from_str(&row.state).ok_or_else(|| DomainError::CorruptCheckpoint {
            checkpoint_id: row.id.clone(),
            reason: format!("unknown run state '{}'", row.state),
        })?;
        Ok(Self {
            checkpoint_id: parse_uuid(&row.id)?,
            run_id: parse_uuid(&row.run_id)?,
            sequence: row.sequence as u64,
            created_at: parse_datetime(&row.created_at)?,
            state,
            round_index: row.round_index as u32,
            last_quality: row.last_quality,
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> DomainResult<()> {
        let payload_json = serde_json::to_string(checkpoint)?;
        let created_at = checkpoint
            .created_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true);

        sqlx::query(
            r#"INSERT INTO checkpoints (
                id, run_id, sequence, state, round_index, last_quality, payload_json, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                run_id = excluded.run_id,
                sequence = excluded.sequence,
                state = excluded.state,
                round_index = excluded.round_index,
                last_quality = excluded.last_quality,
                payload_json = excluded.payload_json,
                created_at = excluded.created_at"#,
        )
        .bind(checkpoint.checkpoint_id.to_string())
        .bind(checkpoint.run_id.to_string())
        .bind(checkpoint.sequence as i64)
        .bind(checkpoint.state.as_str())
        .bind(i64::from(checkpoint.round_index()))
        .bind(checkpoint.last_quality())
        .bind(&payload_json)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_latest(&self, run_id: Uuid) -> DomainResult<Option<Checkpoint>> {
        let row: Option<PayloadRow> = sqlx::query_as(
            "SELECT id, payload_json FROM checkpoints WHERE run_id = ? ORDER BY sequence DESC LIMIT 1",
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::decode(&r.id, &r.payload_json)).transpose()
    }

    async fn load(&self, checkpoint_id: Uuid) -> DomainResult<Option<Checkpoint>> {
        let row: Option<PayloadRow> =
            sqlx::query_as("SELECT id, payload_json FROM checkpoints WHERE id = ?")
                .bind(checkpoint_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| Self::decode(&r.id, &r.payload_json)).transpose()
    }

    async fn list(&self, limit: usize) -> DomainResult<Vec<CheckpointSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"SELECT id, run_id, sequence, state, round_index, last_quality, created_at
            FROM checkpoints ORDER BY rowid DESC LIMIT ?"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CheckpointSummary::try_from).collect()
    }

    async fn latest_run(&self) -> DomainResult<Option<Uuid>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT run_id FROM checkpoints ORDER BY rowid DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(run_id,)| parse_uuid(&run_id)).transpose()
    }

    async fn discard(&self, run_id: Uuid) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE run_id = ?")
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
