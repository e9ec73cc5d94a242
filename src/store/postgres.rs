//! Postgres-backed store. See `sql/schema.sql` for the DDL.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::{AuthStore, NewOneTimeToken, NewSession, NewUser, SessionInsert, UserInsert};
use crate::models::{SessionIdentity, SessionView, TokenPurpose, User, UserStatus};

const DEFAULT_ROLE: &str = "user";

#[derive(Clone)]
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let status: String = row.get("status");
    let status = UserStatus::parse(&status)
        .ok_or_else(|| anyhow!("unknown user status in store: {status}"))?;
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_digest: row.get("password_digest"),
        display_name: row.get("display_name"),
        status,
        email_verified_at: row.get("email_verified_at"),
        roles: row.get("roles"),
        created_at: row.get("created_at"),
    })
}

const USER_SELECT: &str = r"
    SELECT users.id, users.email, users.password_digest, users.display_name,
           users.status, users.email_verified_at, users.created_at,
           COALESCE(
               array_agg(user_roles.role) FILTER (WHERE user_roles.role IS NOT NULL),
               '{}'
           ) AS roles
    FROM users
    LEFT JOIN user_roles ON user_roles.user_id = users.id
";

#[async_trait]
impl AuthStore for PgAuthStore {
    async fn create_user(&self, user: NewUser<'_>) -> Result<UserInsert> {
        // Rely on the unique constraint instead of a check-then-insert so
        // concurrent registrations with the same email cannot both succeed.
        let mut tx = self.pool.begin().await.context("begin create_user")?;

        let query = r"
            INSERT INTO users (email, password_digest, display_name)
            VALUES ($1, $2, $3)
            RETURNING id, created_at
        ";
        let row = sqlx::query(query)
            .bind(user.email)
            .bind(user.password_digest)
            .bind(user.display_name)
            .fetch_one(&mut *tx)
            .instrument(query_span("INSERT", query))
            .await;

        let row = match row {
            Ok(row) => row,
            Err(err) => {
                if is_unique_violation(&err) {
                    let _ = tx.rollback().await;
                    return Ok(UserInsert::EmailConflict);
                }
                return Err(err).context("failed to insert user");
            }
        };

        let id: Uuid = row.get("id");
        let query = "INSERT INTO user_roles (user_id, role) VALUES ($1, $2)";
        sqlx::query(query)
            .bind(id)
            .bind(DEFAULT_ROLE)
            .execute(&mut *tx)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert default role")?;

        tx.commit().await.context("commit create_user")?;

        Ok(UserInsert::Created(User {
            id,
            email: user.email.to_string(),
            password_digest: user.password_digest.to_string(),
            display_name: user.display_name.to_string(),
            status: UserStatus::Pending,
            email_verified_at: None,
            roles: vec![DEFAULT_ROLE.to_string()],
            created_at: row.get("created_at"),
        }))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("{USER_SELECT} WHERE users.email = $1 GROUP BY users.id");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by email")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = format!("{USER_SELECT} WHERE users.id = $1 GROUP BY users.id");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by id")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<()> {
        let query = r"
            UPDATE users
            SET email_verified_at = NOW(),
                status = 'verified',
                updated_at = NOW()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to mark email verified")?;
        Ok(())
    }

    async fn update_password_digest(&self, id: Uuid, digest: &str) -> Result<()> {
        let query = r"
            UPDATE users
            SET password_digest = $2,
                updated_at = NOW()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .bind(digest)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update password digest")?;
        Ok(())
    }

    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> Result<()> {
        let query = r"
            UPDATE users
            SET status = $2,
                updated_at = NOW()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to set user status")?;
        Ok(())
    }

    async fn insert_session(&self, session: NewSession<'_>) -> Result<SessionInsert> {
        let query = r"
            INSERT INTO user_sessions
                (user_id, token_digest, expires_at, user_agent, ip_address, device_label)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'), $4, $5, $6)
            RETURNING expires_at
        ";
        let row = sqlx::query(query)
            .bind(session.user_id)
            .bind(session.token_digest)
            .bind(session.ttl_seconds)
            .bind(session.meta.user_agent.as_deref())
            .bind(session.meta.ip_address.as_deref())
            .bind(session.meta.device_label.as_deref())
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match row {
            Ok(row) => Ok(SessionInsert::Inserted {
                expires_at: row.get("expires_at"),
            }),
            Err(err) if is_unique_violation(&err) => Ok(SessionInsert::DigestConflict),
            Err(err) => Err(err).context("failed to insert session"),
        }
    }

    async fn find_usable_session(&self, token_digest: &[u8]) -> Result<Option<SessionIdentity>> {
        let query = r"
            SELECT id, user_id
            FROM user_sessions
            WHERE token_digest = $1
              AND revoked_at IS NULL
              AND expires_at > NOW()
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(token_digest)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup session")?;
        Ok(row.map(|row| SessionIdentity {
            session_id: row.get("id"),
            user_id: row.get("user_id"),
        }))
    }

    async fn touch_session(&self, session_id: Uuid) -> Result<()> {
        // Records activity for audit without extending the session TTL.
        let query = "UPDATE user_sessions SET last_used_at = NOW() WHERE id = $1";
        sqlx::query(query)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to touch session")?;
        Ok(())
    }

    async fn revoke_session(&self, session_id: Uuid) -> Result<()> {
        let query = r"
            UPDATE user_sessions
            SET revoked_at = NOW()
            WHERE id = $1
              AND revoked_at IS NULL
        ";
        sqlx::query(query)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to revoke session")?;
        Ok(())
    }

    async fn revoke_sessions_for_user(&self, user_id: Uuid) -> Result<u64> {
        let query = r"
            UPDATE user_sessions
            SET revoked_at = NOW()
            WHERE user_id = $1
              AND revoked_at IS NULL
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to revoke sessions for user")?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self) -> Result<u64> {
        let query = "DELETE FROM user_sessions WHERE expires_at <= NOW()";
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete expired sessions")?;
        Ok(result.rows_affected())
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<SessionView>> {
        let query = r"
            SELECT id, created_at, last_used_at, expires_at,
                   user_agent, ip_address, device_label
            FROM user_sessions
            WHERE user_id = $1
              AND revoked_at IS NULL
              AND expires_at > NOW()
            ORDER BY COALESCE(last_used_at, created_at) DESC
        ";
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list active sessions")?;
        Ok(rows
            .into_iter()
            .map(|row| SessionView {
                id: row.get("id"),
                created_at: row.get("created_at"),
                last_used_at: row.get("last_used_at"),
                expires_at: row.get("expires_at"),
                user_agent: row.get("user_agent"),
                ip_address: row.get("ip_address"),
                device_label: row.get("device_label"),
            })
            .collect())
    }

    async fn insert_one_time_token(&self, token: NewOneTimeToken<'_>) -> Result<()> {
        let query = r"
            INSERT INTO one_time_tokens (user_id, token_digest, purpose, expires_at)
            VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
        ";
        sqlx::query(query)
            .bind(token.user_id)
            .bind(token.token_digest)
            .bind(token.purpose.as_str())
            .bind(token.ttl_seconds)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert one-time token")?;
        Ok(())
    }

    async fn consume_one_time_token(
        &self,
        token_digest: &[u8],
        purpose: TokenPurpose,
    ) -> Result<Option<Uuid>> {
        // Single conditional update: two concurrent redemptions of the same
        // leaked token cannot both match the `consumed_at IS NULL` row.
        let query = r"
            UPDATE one_time_tokens
            SET consumed_at = NOW()
            WHERE token_digest = $1
              AND purpose = $2
              AND consumed_at IS NULL
              AND expires_at > NOW()
            RETURNING user_id
        ";
        let row = sqlx::query(query)
            .bind(token_digest)
            .bind(purpose.as_str())
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to consume one-time token")?;
        Ok(row.map(|row| row.get("user_id")))
    }

    async fn delete_dead_tokens(&self) -> Result<u64> {
        let query = r"
            DELETE FROM one_time_tokens
            WHERE expires_at <= NOW()
               OR consumed_at IS NOT NULL
        ";
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete dead tokens")?;
        Ok(result.rows_affected())
    }
}
