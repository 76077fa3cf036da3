use async_trait::async_trait;
use uuid::Uuid;

use super::{Error, ParticipantPair, Result, Room, RoomResolver, StorageContext};
use crate::utils::normalize_email;

/// Display label given to rooms created on first contact.
pub const DEFAULT_ROOM_NAME: &str = "room";

#[derive(Clone)]
pub struct RoomManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> RoomManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl<'a> RoomResolver for RoomManager<'a> {
    async fn find_by_participants(&self, pair: &ParticipantPair) -> Result<Room> {
        sqlx::query_as::<_, Room>(
            "SELECT * FROM rooms WHERE participant_low = ? AND participant_high = ?",
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(self.pool)
        .await
        .storage(|| format!("look up room of {pair}"))?
        .ok_or(Error::RoomNotFound)
    }

    async fn find_or_create_by_participants(&self, pair: &ParticipantPair) -> Result<Room> {
        // The unique pair constraint decides the race: a losing insert is a
        // no-op and the re-select below returns the winner's row.
        let inserted = sqlx::query(concat!(
            "INSERT INTO rooms (id, name, participant_low, participant_high, created_at, updated_at) ",
            "VALUES (?, ?, ?, ?, ",
            now_millis!(),
            ", ",
            now_millis!(),
            ") ON CONFLICT (participant_low, participant_high) DO NOTHING"
        ))
        .bind(Uuid::new_v4())
        .bind(DEFAULT_ROOM_NAME)
        .bind(pair.low())
        .bind(pair.high())
        .execute(self.pool)
        .await
        .storage(|| format!("create room for {pair}"))?;

        if inserted.rows_affected() == 1 {
            tracing::debug!(%pair, "created room");
        }

        self.find_by_participants(pair).await
    }

    async fn find_by_id(&self, room_id: Uuid) -> Result<Room> {
        sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = ?")
            .bind(room_id)
            .fetch_optional(self.pool)
            .await
            .storage(|| format!("look up room {room_id}"))?
            .ok_or(Error::RoomNotFound)
    }

    async fn list_for_participant(&self, email: &str) -> Result<Vec<Room>> {
        let email = normalize_email(email);
        sqlx::query_as::<_, Room>(
            "SELECT * FROM rooms WHERE participant_low = ?1 OR participant_high = ?1 \
             ORDER BY created_at, rowid",
        )
        .bind(&email)
        .fetch_all(self.pool)
        .await
        .storage(|| format!("list rooms of {email}"))
    }
}
