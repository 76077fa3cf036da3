use std::{future::Future, time::Duration};

use uuid::Uuid;

use super::{
    chat_manager::ChatManager, room_manager::RoomManager, user_manager::UserManager, Caller,
    ChatMessage, Error, MessageStore, ParticipantPair, Result, Room, RoomResolver, User,
    UserDirectory,
};

/// Entry point for everything an authenticated caller can do with their
/// conversations. Holds no state of its own beyond the per-operation deadline.
pub struct ConversationManager<U, R, M> {
    users: U,
    rooms: R,
    messages: M,
    deadline: Duration,
}

impl<'a> ConversationManager<UserManager<'a>, RoomManager<'a>, ChatManager<'a>> {
    pub fn sqlite(pool: &'a sqlx::SqlitePool, deadline: Duration) -> Self {
        Self::new(
            UserManager::new(pool),
            RoomManager::new(pool),
            ChatManager::new(pool),
            deadline,
        )
    }
}

impl<U, R, M> ConversationManager<U, R, M>
where
    U: UserDirectory,
    R: RoomResolver,
    M: MessageStore,
{
    pub fn new(users: U, rooms: R, messages: M, deadline: Duration) -> Self {
        Self {
            users,
            rooms,
            messages,
            deadline,
        }
    }

    pub async fn send_by_email(
        &self,
        caller: &Caller,
        counterpart_email: &str,
        content: &str,
    ) -> Result<ChatMessage> {
        self.bounded("send by email", async {
            let counterpart = self.users.resolve(counterpart_email).await?;
            self.messages
                .append_by_participants(caller.user_id, &caller.email, &counterpart.email, content)
                .await
        })
        .await
    }

    pub async fn send_by_room(
        &self,
        caller: &Caller,
        room_id: Uuid,
        content: &str,
    ) -> Result<ChatMessage> {
        self.bounded("send by room", self.messages.append(room_id, caller.user_id, content))
            .await
    }

    pub async fn history(
        &self,
        caller: &Caller,
        counterpart_email: &str,
        after_millis: i64,
    ) -> Result<Vec<ChatMessage>> {
        self.bounded("get history", async {
            let pair = ParticipantPair::new(&caller.email, counterpart_email)?;
            self.messages.list_since(&pair, after_millis).await
        })
        .await
    }

    pub async fn rooms(&self, caller: &Caller) -> Result<Vec<Room>> {
        self.bounded("list rooms", self.rooms.list_for_participant(&caller.email))
            .await
    }

    /// A room the caller does not take part in is reported as missing.
    pub async fn room(&self, caller: &Caller, room_id: Uuid) -> Result<Room> {
        self.bounded("get room", async {
            let room = self.rooms.find_by_id(room_id).await?;
            if room.participants.contains(&caller.email) {
                Ok(room)
            } else {
                Err(Error::RoomNotFound)
            }
        })
        .await
    }

    pub async fn search_users(&self, term: &str) -> Result<Vec<User>> {
        self.bounded("search users", self.users.search(term)).await
    }

    /// Dropping the store future on expiry cancels the in-flight query.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, deadline = ?self.deadline, "deadline elapsed");
                Err(Error::Timeout { operation })
            }
        }
    }
}
