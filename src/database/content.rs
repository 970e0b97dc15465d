//! Content Repository - Document files, comments and reports
//!
//! One table for every kind. The kind-specific body is stored as JSONB, while
//! the columns the workflow filters on (status, report target, auto-approval)
//! are kept flat.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::moderation::{ContentBody, ContentItem, ContentStatus, Deletion, ReviewFields};

const CONTENT_COLUMNS: &str = "id, body, created_by, created_at, status, reviewed_by, \
     reviewed_at, review_note, deleted_by, deleted_at, approval_rewarded_at, version";

const AUTO_APPROVED_COUNT: &str = "SELECT COUNT(*) AS total FROM trust.content_items \
     WHERE created_by = $1 AND kind = 'report' AND auto_approved AND created_at >= $2";

pub struct ContentRepository {
    pool: PgPool,
}

impl ContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trust.content_items (
                id UUID PRIMARY KEY,
                kind VARCHAR(32) NOT NULL,
                body JSONB NOT NULL,
                created_by UUID NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                status VARCHAR(32) NOT NULL,
                reviewed_by UUID,
                reviewed_at TIMESTAMP WITH TIME ZONE,
                review_note TEXT,
                deleted_by UUID,
                deleted_at TIMESTAMP WITH TIME ZONE,
                approval_rewarded_at TIMESTAMP WITH TIME ZONE,
                target_id UUID,
                auto_approved BOOLEAN NOT NULL DEFAULT FALSE,
                version BIGINT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create content_items table: {}", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_content_items_target ON trust.content_items(target_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create content target index: {}", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_content_items_reporter ON trust.content_items(created_by, created_at) WHERE auto_approved",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create content reporter index: {}", e))?;

        info!("Content table initialized");
        Ok(())
    }

    pub async fn get_item(&self, content_id: Uuid) -> Result<Option<ContentItem>, String> {
        let query = format!(
            "SELECT {} FROM trust.content_items WHERE id = $1",
            CONTENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(content_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to get content item: {}", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    pub async fn reports_for_target(&self, target_id: Uuid) -> Result<Vec<ContentItem>, String> {
        let query = format!(
            "SELECT {} FROM trust.content_items \
             WHERE target_id = $1 AND kind = 'report' AND deleted_at IS NULL \
             ORDER BY created_at, id",
            CONTENT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(target_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| format!("Failed to get reports for target: {}", e))?;

        rows.iter().map(item_from_row).collect()
    }

    pub async fn count_auto_approved_since(
        &self,
        reporter_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<usize, String> {
        let row = sqlx::query(AUTO_APPROVED_COUNT)
            .bind(reporter_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| format!("Failed to count auto-approved reports: {}", e))?;

        count_from_row(&row)
    }

    /// Same count, read inside `tx` so it sees the transaction's locks
    pub async fn count_auto_approved_since_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reporter_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<usize, String> {
        let row = sqlx::query(AUTO_APPROVED_COUNT)
            .bind(reporter_id)
            .bind(since)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| format!("Failed to count auto-approved reports: {}", e))?;

        count_from_row(&row)
    }

    /// Returns false when the id is already taken
    pub async fn insert_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        item: &ContentItem,
    ) -> Result<bool, String> {
        let details = item.report();
        let result = sqlx::query(
            r#"
            INSERT INTO trust.content_items
                (id, kind, body, created_by, created_at, status, reviewed_by, reviewed_at,
                 review_note, deleted_by, deleted_at, approval_rewarded_at, target_id,
                 auto_approved, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO NOTHING
        "#,
        )
        .bind(item.id)
        .bind(item.kind().as_str())
        .bind(Json(&item.body))
        .bind(item.created_by)
        .bind(item.created_at)
        .bind(item.status().as_str())
        .bind(item.review.reviewed_by)
        .bind(item.review.reviewed_at)
        .bind(&item.review.review_note)
        .bind(item.deletion.map(|d| d.deleted_by))
        .bind(item.deletion.map(|d| d.deleted_at))
        .bind(item.approval_rewarded_at)
        .bind(details.map(|d| d.target.id()))
        .bind(details.map_or(false, |d| d.auto_approved))
        .bind(item.version)
        .execute(&mut **tx)
        .await
        .map_err(|e| format!("Failed to insert content item: {}", e))?;

        Ok(result.rows_affected() == 1)
    }

    /// Returns false when the stored version is not `expected_version`
    pub async fn update_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        item: &ContentItem,
        expected_version: i64,
    ) -> Result<bool, String> {
        let result = sqlx::query(
            r#"
            UPDATE trust.content_items SET
                status = $2,
                reviewed_by = $3,
                reviewed_at = $4,
                review_note = $5,
                deleted_by = $6,
                deleted_at = $7,
                approval_rewarded_at = $8,
                version = $9
            WHERE id = $1 AND version = $10
        "#,
        )
        .bind(item.id)
        .bind(item.status().as_str())
        .bind(item.review.reviewed_by)
        .bind(item.review.reviewed_at)
        .bind(&item.review.review_note)
        .bind(item.deletion.map(|d| d.deleted_by))
        .bind(item.deletion.map(|d| d.deleted_at))
        .bind(item.approval_rewarded_at)
        .bind(item.version)
        .bind(expected_version)
        .execute(&mut **tx)
        .await
        .map_err(|e| format!("Failed to update content item: {}", e))?;

        Ok(result.rows_affected() == 1)
    }
}

fn decode_err(e: sqlx::Error) -> String {
    format!("Failed to decode content row: {}", e)
}

fn count_from_row(row: &PgRow) -> Result<usize, String> {
    let total: i64 = row
        .try_get("total")
        .map_err(|e| format!("Failed to decode report count: {}", e))?;
    Ok(total.max(0) as usize)
}

fn item_from_row(row: &PgRow) -> Result<ContentItem, String> {
    let body: Json<ContentBody> = row.try_get("body").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let status = status
        .parse::<ContentStatus>()
        .map_err(|e| e.to_string())?;

    let deleted_by: Option<Uuid> = row.try_get("deleted_by").map_err(decode_err)?;
    let deleted_at: Option<DateTime<Utc>> = row.try_get("deleted_at").map_err(decode_err)?;
    let deletion = match (deleted_by, deleted_at) {
        (Some(deleted_by), Some(deleted_at)) => Some(Deletion {
            deleted_by,
            deleted_at,
        }),
        _ => None,
    };

    Ok(ContentItem {
        id: row.try_get("id").map_err(decode_err)?,
        body: body.0,
        created_by: row.try_get("created_by").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
        review: ReviewFields {
            status,
            reviewed_by: row.try_get("reviewed_by").map_err(decode_err)?,
            reviewed_at: row.try_get("reviewed_at").map_err(decode_err)?,
            review_note: row.try_get("review_note").map_err(decode_err)?,
        },
        deletion,
        approval_rewarded_at: row.try_get("approval_rewarded_at").map_err(decode_err)?,
        version: row.try_get("version").map_err(decode_err)?,
    })
}
