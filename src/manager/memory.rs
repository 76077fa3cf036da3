//! In-process stand-in for the SQLite managers, used by unit tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{
    room_manager::DEFAULT_ROOM_NAME, ChatMessage, Error, MessageStore, ParticipantPair, Result,
    Room, RoomResolver, User, UserDirectory,
};
use crate::utils::normalize_email;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    rooms: HashMap<ParticipantPair, Room>,
    messages: Vec<ChatMessage>,
    last_millis: i64,
}

impl Tables {
    /// Never runs backwards, like message timestamps in the SQLite store.
    fn now_millis(&mut self) -> i64 {
        self.last_millis = self.last_millis.max(Utc::now().timestamp_millis());
        self.last_millis
    }

    fn room_by_id(&self, room_id: Uuid) -> Option<&Room> {
        self.rooms.values().find(|room| room.id == room_id)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn add_user(&self, name: &str, email: &str) -> User {
        let mut tables = self.lock();
        let now = tables.now_millis();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            email: email.to_owned(),
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        user
    }

    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn resolve(&self, email: &str) -> Result<User> {
        let key = normalize_email(email);
        self.lock()
            .users
            .iter()
            .find(|user| normalize_email(&user.email) == key)
            .cloned()
            .ok_or_else(|| Error::UserNotFound(email.to_owned()))
    }

    async fn search(&self, term: &str) -> Result<Vec<User>> {
        let term = term.trim().to_lowercase();
        Ok(self
            .lock()
            .users
            .iter()
            .filter(|user| {
                user.name.to_lowercase().starts_with(&term)
                    || normalize_email(&user.email).starts_with(&term)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RoomResolver for MemoryStore {
    async fn find_by_participants(&self, pair: &ParticipantPair) -> Result<Room> {
        self.lock().rooms.get(pair).cloned().ok_or(Error::RoomNotFound)
    }

    async fn find_or_create_by_participants(&self, pair: &ParticipantPair) -> Result<Room> {
        let mut tables = self.lock();
        let now = tables.now_millis();
        let room = tables.rooms.entry(pair.clone()).or_insert_with(|| Room {
            id: Uuid::new_v4(),
            name: DEFAULT_ROOM_NAME.to_owned(),
            participants: pair.clone(),
            created_at: now,
            updated_at: now,
        });
        Ok(room.clone())
    }

    async fn find_by_id(&self, room_id: Uuid) -> Result<Room> {
        self.lock()
            .room_by_id(room_id)
            .cloned()
            .ok_or(Error::RoomNotFound)
    }

    async fn list_for_participant(&self, email: &str) -> Result<Vec<Room>> {
        let mut rooms: Vec<Room> = self
            .lock()
            .rooms
            .values()
            .filter(|room| room.participants.contains(email))
            .cloned()
            .collect();
        rooms.sort_by_key(|room| room.created_at);
        Ok(rooms)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, room_id: Uuid, author_id: Uuid, content: &str) -> Result<ChatMessage> {
        let mut tables = self.lock();
        let known_room = tables.room_by_id(room_id).is_some();
        let known_author = tables.users.iter().any(|user| user.id == author_id);
        if !known_room || !known_author {
            return Err(Error::Storage {
                context: format!("append message from {author_id} to room {room_id}"),
                source: "FOREIGN KEY constraint failed".into(),
            });
        }

        let now = tables.now_millis();
        let message = ChatMessage {
            id: Uuid::new_v4(),
            user_id: author_id,
            room_id,
            content: content.to_owned(),
            created_at: now,
            updated_at: now,
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn append_by_participants(
        &self,
        author_id: Uuid,
        author_email: &str,
        counterpart_email: &str,
        content: &str,
    ) -> Result<ChatMessage> {
        let pair = ParticipantPair::new(author_email, counterpart_email)?;
        let room = self.find_or_create_by_participants(&pair).await?;
        self.append(room.id, author_id, content).await
    }

    async fn list_since(
        &self,
        pair: &ParticipantPair,
        after_millis: i64,
    ) -> Result<Vec<ChatMessage>> {
        let tables = self.lock();
        let room = tables.rooms.get(pair).ok_or(Error::RoomNotFound)?;
        // insertion order already breaks created_at ties
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.room_id == room.id && m.created_at > after_millis)
            .cloned()
            .collect())
    }
}
