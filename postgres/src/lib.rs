//! `PostgreSQL` ticket store for the helpdesk pipeline.
//!
//! Implements the [`TicketStore`] trait from `helpdesk-core` on a sqlx
//! connection pool:
//!
//! - Lists are ordered newest first
//! - Updates are a compare-and-set on the `version` column, so a write based on
//!   a stale read fails with [`StoreError::Conflict`] instead of silently
//!   overwriting a concurrent change
//!
//! # Example
//!
//! ```ignore
//! use helpdesk_postgres::PostgresTicketStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresTicketStore::new("postgres://localhost/helpdesk", 10).await?;
//!     store.ensure_schema().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use helpdesk_core::error::StoreError;
use helpdesk_core::model::{Ticket, TicketId, TicketStatus, UserId};
use helpdesk_core::store::TicketStore;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

const SCHEMA: [&str; 3] = [
    r"
    CREATE TABLE IF NOT EXISTS tickets (
        id UUID PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'open',
        category TEXT NOT NULL DEFAULT '',
        priority TEXT NOT NULL DEFAULT 'low',
        suggestion TEXT,
        user_id UUID NOT NULL,
        agent_id UUID,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        version BIGINT NOT NULL DEFAULT 1
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_tickets_user_created ON tickets(user_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_created ON tickets(created_at DESC)",
];

const TICKET_COLUMNS: &str = "id, title, description, status, category, priority, suggestion, \
                              user_id, agent_id, created_at, updated_at, version";

/// `PostgreSQL`-backed [`TicketStore`].
#[derive(Clone, Debug)]
pub struct PostgresTicketStore {
    pool: PgPool,
}

impl PostgresTicketStore {
    /// Connect to `database_url` with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pool cannot connect.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `tickets` table and its indexes if they do not exist.
    ///
    /// Idempotent; safe to call from every service at startup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a statement fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(format!("Schema setup failed: {e}")))?;
        }
        tracing::debug!("Ticket schema ensured");
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query, used by readiness checks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database is unreachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    fn row_to_ticket(row: &PgRow) -> Result<Ticket, StoreError> {
        let id: Uuid = row.try_get("id").map_err(db_error)?;
        let user_id: Uuid = row.try_get("user_id").map_err(db_error)?;
        let agent_id: Option<Uuid> = row.try_get("agent_id").map_err(db_error)?;
        let status: String = row.try_get("status").map_err(db_error)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_error)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(db_error)?;

        Ok(Ticket {
            id: TicketId::from_uuid(id),
            title: row.try_get("title").map_err(db_error)?,
            description: row.try_get("description").map_err(db_error)?,
            status: TicketStatus::new(status),
            category: row.try_get("category").map_err(db_error)?,
            priority: row.try_get("priority").map_err(db_error)?,
            suggestion: row.try_get("suggestion").map_err(db_error)?,
            user_id: UserId::from_uuid(user_id),
            agent_id: agent_id.map(UserId::from_uuid),
            created_at,
            updated_at,
            version: row.try_get("version").map_err(db_error)?,
        })
    }

    async fn fetch_list(&self, owner: Option<UserId>) -> Result<Vec<Ticket>, StoreError> {
        let rows = match owner {
            Some(owner) => {
                let sql = format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets WHERE user_id = $1 ORDER BY created_at DESC"
                );
                sqlx::query(&sql)
                    .bind(*owner.as_uuid())
                    .fetch_all(&self.pool)
                    .await
            },
            None => {
                let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets ORDER BY created_at DESC");
                sqlx::query(&sql).fetch_all(&self.pool).await
            },
        }
        .map_err(db_error)?;

        rows.iter().map(Self::row_to_ticket).collect()
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl TicketStore for PostgresTicketStore {
    fn insert(
        &self,
        ticket: &Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let ticket = ticket.clone();
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO tickets (
                    id, title, description, status, category, priority, suggestion,
                    user_id, agent_id, created_at, updated_at, version
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ",
            )
            .bind(*ticket.id.as_uuid())
            .bind(&ticket.title)
            .bind(&ticket.description)
            .bind(ticket.status.as_str())
            .bind(&ticket.category)
            .bind(&ticket.priority)
            .bind(&ticket.suggestion)
            .bind(*ticket.user_id.as_uuid())
            .bind(ticket.agent_id.map(|a| *a.as_uuid()))
            .bind(ticket.created_at)
            .bind(ticket.updated_at)
            .bind(ticket.version)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

            tracing::debug!(ticket_id = %ticket.id, "Ticket inserted");
            metrics::counter!("helpdesk_store_writes_total", "op" => "insert").increment(1);
            Ok(())
        })
    }

    fn find_by_id(
        &self,
        id: TicketId,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?
                .ok_or(StoreError::NotFound(id))?;

            Self::row_to_ticket(&row)
        })
    }

    fn list_by_user(
        &self,
        user: UserId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticket>, StoreError>> + Send + '_>> {
        Box::pin(self.fetch_list(Some(user)))
    }

    fn list_all(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Ticket>, StoreError>> + Send + '_>> {
        Box::pin(self.fetch_list(None))
    }

    fn update(
        &self,
        ticket: &Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, StoreError>> + Send + '_>> {
        let ticket = ticket.clone();
        Box::pin(async move {
            let sql = format!(
                r"
                UPDATE tickets
                SET title = $2, description = $3, status = $4, category = $5, priority = $6,
                    suggestion = $7, agent_id = $8, updated_at = $9, version = version + 1
                WHERE id = $1 AND version = $10
                RETURNING {TICKET_COLUMNS}
                "
            );
            let row = sqlx::query(&sql)
                .bind(*ticket.id.as_uuid())
                .bind(&ticket.title)
                .bind(&ticket.description)
                .bind(ticket.status.as_str())
                .bind(&ticket.category)
                .bind(&ticket.priority)
                .bind(&ticket.suggestion)
                .bind(ticket.agent_id.map(|a| *a.as_uuid()))
                .bind(ticket.updated_at)
                .bind(ticket.version)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

            if let Some(row) = row {
                metrics::counter!("helpdesk_store_writes_total", "op" => "update").increment(1);
                return Self::row_to_ticket(&row);
            }

            // Zero rows: either the ticket is gone or another writer got there first
            let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM tickets WHERE id = $1")
                .bind(*ticket.id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

            match exists {
                None => Err(StoreError::NotFound(ticket.id)),
                Some((current,)) => {
                    tracing::debug!(
                        ticket_id = %ticket.id,
                        expected = ticket.version,
                        current,
                        "Version conflict on ticket update"
                    );
                    metrics::counter!("helpdesk_store_conflicts_total").increment(1);
                    Err(StoreError::Conflict {
                        ticket_id: ticket.id,
                        expected: ticket.version,
                    })
                },
            }
        })
    }
}
