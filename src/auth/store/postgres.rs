//! PostgreSQL adapter (`sql/schema.sql`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use super::{
    CredentialStore, InsertOutcome, Principal, RefreshRecord, RotateOutcome, Session, SessionStore,
};

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn principal_from_row(row: &PgRow) -> Principal {
    Principal {
        id: row.get("id"),
        identifier: row.get("identifier"),
        secret_hash: row.get("secret_hash"),
        roles: row.get("roles"),
    }
}

fn session_from_row(row: &PgRow) -> Session {
    let rotations: i32 = row.get("rotations");
    Session {
        id: row.get("id"),
        principal_id: row.get("principal_id"),
        created_at: row.get("created_at"),
        revoked_at: row.get("revoked_at"),
        rotations: u32::try_from(rotations).unwrap_or(0),
    }
}

fn refresh_from_row(row: &PgRow) -> RefreshRecord {
    RefreshRecord {
        token_hash: row.get("token_hash"),
        session_id: row.get("session_id"),
        principal_id: row.get("principal_id"),
        expires_at: row.get("expires_at"),
        used_at: row.get("used_at"),
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Principal>> {
        let query = "SELECT id, identifier, secret_hash, roles FROM principals WHERE identifier = $1";
        let row = sqlx::query(query)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup principal by identifier")?;
        Ok(row.as_ref().map(principal_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        let query = "SELECT id, identifier, secret_hash, roles FROM principals WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup principal by id")?;
        Ok(row.as_ref().map(principal_from_row))
    }

    async fn insert_principal(
        &self,
        identifier: &str,
        secret_hash: &str,
        roles: &[String],
    ) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO principals (id, identifier, secret_hash, roles)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (identifier) DO NOTHING
            RETURNING id, identifier, secret_hash, roles
        ";
        let row = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(identifier)
            .bind(secret_hash)
            .bind(roles)
            .fetch_optional(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert principal")?;
        Ok(row.as_ref().map_or(InsertOutcome::Conflict, |row| {
            InsertOutcome::Created(principal_from_row(row))
        }))
    }

    async fn update_secret(&self, id: Uuid, secret_hash: &str) -> Result<bool> {
        let query = "UPDATE principals SET secret_hash = $2, updated_at = NOW() WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .bind(secret_hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update secret")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_principal(&self, id: Uuid) -> Result<bool> {
        let query = "DELETE FROM principals WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete principal")?;
        Ok(result.rows_affected() > 0)
    }

    async fn health(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await
            .context("failed to acquire database connection")?;
        conn.ping()
            .instrument(info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING"
            ))
            .await
            .context("failed to ping database")
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, session: &Session, refresh: &RefreshRecord) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin session transaction")?;

        let query = r"
            INSERT INTO sessions (id, principal_id, created_at, revoked_at, rotations)
            VALUES ($1, $2, $3, $4, $5)
        ";
        sqlx::query(query)
            .bind(&session.id)
            .bind(session.principal_id)
            .bind(session.created_at)
            .bind(session.revoked_at)
            .bind(i32::try_from(session.rotations).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert session")?;

        insert_refresh(&mut tx, refresh).await?;

        tx.commit().await.context("commit session transaction")?;
        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<Session>> {
        let query =
            "SELECT id, principal_id, created_at, revoked_at, rotations FROM sessions WHERE id = $1";
        let row = sqlx::query(query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup session")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn find_refresh(&self, token_hash: &[u8]) -> Result<Option<RefreshRecord>> {
        let query = r"
            SELECT token_hash, session_id, principal_id, expires_at, used_at
            FROM refresh_tokens
            WHERE token_hash = $1
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup refresh token")?;
        Ok(row.as_ref().map(refresh_from_row))
    }

    async fn rotate_refresh(
        &self,
        old_hash: &[u8],
        next: &RefreshRecord,
        now: i64,
    ) -> Result<RotateOutcome> {
        let mut tx = self.pool.begin().await.context("begin rotate transaction")?;

        // The conditional update is the single point that decides who wins a rotation race.
        let query = "UPDATE refresh_tokens SET used_at = $2 WHERE token_hash = $1 AND used_at IS NULL";
        let consumed = sqlx::query(query)
            .bind(old_hash)
            .bind(now)
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to consume refresh token")?;
        if consumed.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Ok(RotateOutcome::AlreadyUsed);
        }

        let query = "UPDATE sessions SET rotations = rotations + 1 WHERE id = $1";
        sqlx::query(query)
            .bind(&next.session_id)
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to bump session rotations")?;

        insert_refresh(&mut tx, next).await?;

        tx.commit().await.context("commit rotate transaction")?;
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke_session(&self, session_id: &str, now: i64) -> Result<bool> {
        let query = "UPDATE sessions SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL";
        let result = sqlx::query(query)
            .bind(session_id)
            .bind(now)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to revoke session")?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_principal_sessions(&self, principal_id: Uuid, now: i64) -> Result<u64> {
        let query =
            "UPDATE sessions SET revoked_at = $2 WHERE principal_id = $1 AND revoked_at IS NULL";
        let result = sqlx::query(query)
            .bind(principal_id)
            .bind(now)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to revoke principal sessions")?;
        Ok(result.rows_affected())
    }
}

async fn insert_refresh(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    refresh: &RefreshRecord,
) -> Result<()> {
    let query = r"
        INSERT INTO refresh_tokens (token_hash, session_id, principal_id, expires_at, used_at)
        VALUES ($1, $2, $3, $4, $5)
    ";
    sqlx::query(query)
        .bind(&refresh.token_hash)
        .bind(&refresh.session_id)
        .bind(refresh.principal_id)
        .bind(refresh.expires_at)
        .bind(refresh.used_at)
        .execute(&mut **tx)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to insert refresh token")?;
    Ok(())
}
