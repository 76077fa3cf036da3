use async_trait::async_trait;
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use crate::utils::normalize_email;

/// SQL expression evaluated by SQLite to the current time in epoch milliseconds.
macro_rules! now_millis {
    () => {
        "CAST(ROUND((julianday('now') - 2440587.5) * 86400000) AS INTEGER)"
    };
}

pub mod chat_manager;
pub mod conversation_manager;
pub mod login_manager;
#[cfg(test)]
pub mod memory;
pub mod room_manager;
pub mod session_manager;
pub mod user_manager;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("room not found")]
    RoomNotFound,
    #[error("a conversation needs two different participants")]
    SameParticipant,
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },
    #[error("storage failure while trying to {context}")]
    Storage {
        context: String,
        #[source]
        source: BoxError,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Attaches the failed operation and its identifiers to a store error.
pub(crate) trait StorageContext<T> {
    fn storage<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> StorageContext<T> for Result<T, sqlx::Error> {
    fn storage<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| Error::Storage {
            context: context(),
            source: source.into(),
        })
    }
}

/// Verified identity of whoever is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Message timestamps are epoch milliseconds; `created_at` doubles as the
/// history cursor.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub room_id: Uuid,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Unordered pair of participant emails, kept in canonical order so that
/// `{a, b}` and `{b, a}` compare equal.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantPair(String, String);

impl ParticipantPair {
    pub fn new(a: &str, b: &str) -> Result<Self> {
        let (a, b) = (normalize_email(a), normalize_email(b));
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self(a, b)),
            std::cmp::Ordering::Greater => Ok(Self(b, a)),
            std::cmp::Ordering::Equal => Err(Error::SameParticipant),
        }
    }

    pub fn low(&self) -> &str {
        &self.0
    }

    pub fn high(&self) -> &str {
        &self.1
    }

    pub fn contains(&self, email: &str) -> bool {
        let email = normalize_email(email);
        self.0 == email || self.1 == email
    }
}

impl std::fmt::Display for ParticipantPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}, {}}}", self.0, self.1)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub participants: ParticipantPair,
    pub created_at: i64,
    pub updated_at: i64,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Room {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            participants: ParticipantPair(
                row.try_get("participant_low")?,
                row.try_get("participant_high")?,
            ),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Looks users up by their email address.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fails with [`Error::UserNotFound`] when nobody registered `email`.
    async fn resolve(&self, email: &str) -> Result<User>;

    async fn search(&self, term: &str) -> Result<Vec<User>>;
}

/// Finds, and when needed creates, the single room of a participant pair.
#[async_trait]
pub trait RoomResolver: Send + Sync {
    async fn find_by_participants(&self, pair: &ParticipantPair) -> Result<Room>;

    /// Returns the pair's room, creating it if this is their first contact.
    /// Concurrent callers with the same pair all observe the same room.
    async fn find_or_create_by_participants(&self, pair: &ParticipantPair) -> Result<Room>;

    async fn find_by_id(&self, room_id: Uuid) -> Result<Room>;

    /// Every room where `email` is one of the two participants.
    async fn list_for_participant(&self, email: &str) -> Result<Vec<Room>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, room_id: Uuid, author_id: Uuid, content: &str) -> Result<ChatMessage>;

    /// Resolves or creates the room of `{author_email, counterpart_email}`
    /// and appends to it. A created room survives a failed append.
    async fn append_by_participants(
        &self,
        author_id: Uuid,
        author_email: &str,
        counterpart_email: &str,
        content: &str,
    ) -> Result<ChatMessage>;

    /// Messages of the pair's room created strictly after `after_millis`,
    /// oldest first.
    async fn list_since(
        &self,
        pair: &ParticipantPair,
        after_millis: i64,
    ) -> Result<Vec<ChatMessage>>;
}
