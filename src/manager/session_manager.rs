use std::fmt::Display;

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use super::{Caller, User};

const SESSION_ID_LEN: usize = 32;

#[derive(sqlx::Type, Debug, Clone, PartialEq, Eq)]
#[sqlx(transparent)]
pub struct SessionId(pub String);

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("session does not exist")]
    DoesNotExist,
    #[error("session expired")]
    Expired,
    #[error("database error: {0}")]
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::DoesNotExist,
            _ => Error::DatabaseError(err),
        }
    }
}

fn random_session_id() -> SessionId {
    let mut rng = rand::thread_rng();
    SessionId(
        (0..SESSION_ID_LEN)
            .map(|_| rng.sample(Alphanumeric))
            .map(char::from)
            .collect::<String>(),
    )
}

#[derive(Clone)]
pub struct SessionManager<'a> {
    pool: &'a sqlx::SqlitePool,
    ttl: Duration,
}

impl<'a> SessionManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }
}

impl SessionManager<'_> {
    /// Resolves a session id to the identity that owns it.
    pub async fn get_caller(&self, session_id: &SessionId) -> Result<Caller, Error> {
        let (user_id, email, expires_at): (Uuid, String, i64) = sqlx::query_as(
            "SELECT u.id, u.email, s.expires_at FROM user_sessions s \
             JOIN users u ON u.id = s.user_id WHERE s.session_id = ?",
        )
        .bind(session_id)
        .fetch_one(self.pool)
        .await?;

        if expires_at <= Utc::now().timestamp_millis() {
            self.end_session(session_id).await?;
            tracing::debug!(%user_id, "removed expired session");
            return Err(Error::Expired);
        }
        Ok(Caller { user_id, email })
    }

    pub async fn generate_session_id_for(&self, user: &User) -> Result<SessionId, sqlx::Error> {
        let sid = random_session_id();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO user_sessions (session_id, user_id, created_at, expires_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&sid)
        .bind(user.id)
        .bind(now.timestamp_millis())
        .bind((now + self.ttl).timestamp_millis())
        .execute(self.pool)
        .await?;

        Ok(sid)
    }

    pub async fn end_session(&self, session_id: &SessionId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM user_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
