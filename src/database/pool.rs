//! Database Connection Pool using sqlx

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::info;

use crate::database::content::ContentRepository;
use crate::database::ledger::LedgerRepository;
use crate::database::members::MemberRepository;

pub struct DatabasePool {
    pool: PgPool,
    members: MemberRepository,
    ledger: LedgerRepository,
    content: ContentRepository,
}

impl DatabasePool {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, String> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .map_err(|e| format!("Failed to connect to PostgreSQL: {}", e))?;

        info!(max_connections = max_connections, "Connected to PostgreSQL");

        let members = MemberRepository::new(pool.clone());
        let ledger = LedgerRepository::new(pool.clone());
        let content = ContentRepository::new(pool.clone());

        Ok(Self {
            pool,
            members,
            ledger,
            content,
        })
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        info!("Initializing database schema...");

        sqlx::query("CREATE SCHEMA IF NOT EXISTS trust")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create trust schema: {}", e))?;

        self.members.init_schema().await?;
        self.ledger.init_schema().await?;
        self.content.init_schema().await?;

        info!("Database schema initialized");
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, String> {
        self.pool
            .begin()
            .await
            .map_err(|e| format!("Failed to begin transaction: {}", e))
    }

    pub fn members(&self) -> &MemberRepository {
        &self.members
    }

    pub fn ledger(&self) -> &LedgerRepository {
        &self.ledger
    }

    pub fn content(&self) -> &ContentRepository {
        &self.content
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
