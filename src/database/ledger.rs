//! Ledger Repository - Append-only entries and the score cache
//!
//! `ledger_entries` only ever receives INSERTs. `user_scores` is the
//! materialized per-user sum, bumped in the same transaction as the entries.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::trust::{EntityType, ScoreDrift, TrustLedgerEntry};

const ENTRY_COLUMNS: &str =
    "id, user_id, entity_id, entity_type, score_delta, reason, created_at";

pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trust.ledger_entries (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                entity_id UUID,
                entity_type VARCHAR(32),
                score_delta INTEGER NOT NULL,
                reason TEXT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create ledger_entries table: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trust.user_scores (
                user_id UUID PRIMARY KEY,
                score INTEGER NOT NULL DEFAULT 0,
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create user_scores table: {}", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ledger_entries_user ON trust.ledger_entries(user_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create ledger user index: {}", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ledger_entries_entity ON trust.ledger_entries(entity_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create ledger entity index: {}", e))?;

        info!("Ledger tables initialized");
        Ok(())
    }

    pub async fn get_cached_score(&self, user_id: Uuid) -> Result<i32, String> {
        let row = sqlx::query("SELECT score FROM trust.user_scores WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to get cached score: {}", e))?;

        match row {
            Some(row) => row
                .try_get("score")
                .map_err(|e| format!("Failed to decode cached score: {}", e)),
            None => Ok(0),
        }
    }

    pub async fn sum_entries(&self, user_id: Uuid) -> Result<i32, String> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(score_delta), 0)::INTEGER AS total FROM trust.ledger_entries WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| format!("Failed to sum ledger entries: {}", e))?;

        row.try_get("total")
            .map_err(|e| format!("Failed to decode ledger sum: {}", e))
    }

    pub async fn entries_for_user(&self, user_id: Uuid) -> Result<Vec<TrustLedgerEntry>, String> {
        let query = format!(
            "SELECT {} FROM trust.ledger_entries WHERE user_id = $1 ORDER BY created_at, id",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| format!("Failed to get user entries: {}", e))?;

        rows.iter().map(entry_from_row).collect()
    }

    pub async fn entries_for_entity(
        &self,
        entity_id: Uuid,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<TrustLedgerEntry>, String> {
        let query = format!(
            "SELECT {} FROM trust.ledger_entries \
             WHERE entity_id = $1 AND ($2::VARCHAR IS NULL OR entity_type = $2) \
             ORDER BY created_at, id",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(entity_id)
            .bind(entity_type.map(|t| t.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| format!("Failed to get entity entries: {}", e))?;

        rows.iter().map(entry_from_row).collect()
    }

    pub async fn score_drift(&self) -> Result<Vec<ScoreDrift>, String> {
        let rows = sqlx::query(
            r#"
            SELECT COALESCE(l.user_id, s.user_id) AS user_id,
                   COALESCE(s.score, 0) AS cached,
                   COALESCE(l.total, 0) AS ledger
            FROM (
                SELECT user_id, SUM(score_delta)::INTEGER AS total
                FROM trust.ledger_entries
                GROUP BY user_id
            ) l
            FULL OUTER JOIN trust.user_scores s ON s.user_id = l.user_id
            WHERE COALESCE(s.score, 0) <> COALESCE(l.total, 0)
        "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to compute score drift: {}", e))?;

        rows.iter()
            .map(|row| {
                Ok(ScoreDrift {
                    user_id: row.try_get("user_id").map_err(decode_err)?,
                    cached: row.try_get("cached").map_err(decode_err)?,
                    ledger: row.try_get("ledger").map_err(decode_err)?,
                })
            })
            .collect()
    }

    pub async fn set_cached_score(&self, user_id: Uuid, score: i32) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO trust.user_scores (user_id, score, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                score = EXCLUDED.score,
                updated_at = NOW()
        "#,
        )
        .bind(user_id)
        .bind(score)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to set cached score: {}", e))?;

        Ok(())
    }

    pub async fn insert_entry(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry: &TrustLedgerEntry,
    ) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO trust.ledger_entries
                (id, user_id, entity_id, entity_type, score_delta, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.entity_id)
        .bind(entry.entity_type.map(|t| t.as_str()))
        .bind(entry.score_delta)
        .bind(&entry.reason)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| format!("Failed to insert ledger entry: {}", e))?;

        Ok(())
    }

    pub async fn bump_score(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        delta: i32,
    ) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO trust.user_scores (user_id, score, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                score = trust.user_scores.score + EXCLUDED.score,
                updated_at = NOW()
        "#,
        )
        .bind(user_id)
        .bind(delta)
        .execute(&mut **tx)
        .await
        .map_err(|e| format!("Failed to bump cached score: {}", e))?;

        Ok(())
    }
}

fn decode_err(e: sqlx::Error) -> String {
    format!("Failed to decode ledger row: {}", e)
}

fn entry_from_row(row: &PgRow) -> Result<TrustLedgerEntry, String> {
    let entity_type: Option<String> = row.try_get("entity_type").map_err(decode_err)?;
    let entity_type = entity_type
        .map(|t| t.parse::<EntityType>())
        .transpose()
        .map_err(|e| e.to_string())?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode_err)?;

    Ok(TrustLedgerEntry {
        id: row.try_get("id").map_err(decode_err)?,
        user_id: row.try_get("user_id").map_err(decode_err)?,
        entity_id: row.try_get("entity_id").map_err(decode_err)?,
        entity_type,
        score_delta: row.try_get("score_delta").map_err(decode_err)?,
        reason: row.try_get("reason").map_err(decode_err)?,
        created_at,
    })
}
