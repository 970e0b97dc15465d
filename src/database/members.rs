//! Member Repository - Roles mirrored from the identity service

use sqlx::postgres::PgPool;
use sqlx::{Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::store::UserProfile;
use crate::trust::Role;

pub struct MemberRepository {
    pool: PgPool,
}

impl MemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trust.members (
                user_id UUID PRIMARY KEY,
                role VARCHAR(16) NOT NULL DEFAULT 'User',
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create members table: {}", e))?;

        info!("Members table initialized");
        Ok(())
    }

    pub async fn get_member(&self, user_id: Uuid) -> Result<Option<UserProfile>, String> {
        let row = sqlx::query("SELECT user_id, role FROM trust.members WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to get member: {}", e))?;

        match row {
            Some(row) => {
                let id: Uuid = row
                    .try_get("user_id")
                    .map_err(|e| format!("Failed to decode member: {}", e))?;
                let role: String = row
                    .try_get("role")
                    .map_err(|e| format!("Failed to decode member: {}", e))?;
                let role = role.parse::<Role>().map_err(|e| e.to_string())?;
                Ok(Some(UserProfile { id, role }))
            }
            None => Ok(None),
        }
    }

    /// Lock the member row until `tx` ends, serializing quota checks per member
    pub async fn lock_member(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> Result<(), String> {
        sqlx::query("SELECT user_id FROM trust.members WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| format!("Failed to lock member: {}", e))?;

        Ok(())
    }
}
