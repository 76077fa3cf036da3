use async_trait::async_trait;
use uuid::Uuid;

use super::{
    room_manager::RoomManager, ChatMessage, MessageStore, ParticipantPair, Result, RoomResolver,
    StorageContext,
};

pub struct ChatManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> ChatManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl<'a> MessageStore for ChatManager<'a> {
    async fn append(&self, room_id: Uuid, author_id: Uuid, content: &str) -> Result<ChatMessage> {
        let id = Uuid::new_v4();
        // created_at never drops below the room's newest message, so a cursor
        // taken from any returned message cannot skip a later one.
        sqlx::query(concat!(
            "INSERT INTO messages (id, user_id, room_id, content, created_at, updated_at) ",
            "SELECT ?1, ?2, ?3, ?4, ts, ts FROM (SELECT MAX(",
            now_millis!(),
            ", COALESCE(MAX(created_at), 0)) AS ts FROM messages WHERE room_id = ?3)"
        ))
        .bind(id)
        .bind(author_id)
        .bind(room_id)
        .bind(content)
        .execute(self.pool)
        .await
        .storage(|| format!("append message from {author_id} to room {room_id}"))?;

        let message = sqlx::query_as::<_, ChatMessage>("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool)
            .await
            .storage(|| format!("read back message {id}"))?;

        tracing::debug!(message_id = %message.id, %room_id, "appended message");
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
        // The room commits on its own; a failed append leaves it for the retry.
        let room = RoomManager::new(self.pool)
            .find_or_create_by_participants(&pair)
            .await?;
        self.append(room.id, author_id, content).await
    }

    async fn list_since(
        &self,
        pair: &ParticipantPair,
        after_millis: i64,
    ) -> Result<Vec<ChatMessage>> {
        let room = RoomManager::new(self.pool).find_by_participants(pair).await?;
        sqlx::query_as::<_, ChatMessage>(
            "SELECT * FROM messages WHERE room_id = ? AND created_at > ? \
             ORDER BY created_at, rowid",
        )
        .bind(room.id)
        .bind(after_millis)
        .fetch_all(self.pool)
        .await
        .storage(|| format!("list messages of room {} after {after_millis}", room.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Error;

    const ALICE: Uuid = Uuid::from_u128(0x11111111_1111_4111_8111_111111111111);
    const BOB: Uuid = Uuid::from_u128(0x22222222_2222_4222_8222_222222222222);
    const ALICE_BOB_ROOM: Uuid = Uuid::from_u128(0xaaaaaaaa_aaaa_4aaa_8aaa_aaaaaaaaaaaa);

    fn alice_bob() -> ParticipantPair {
        ParticipantPair::new("alice@example.com", "bob@example.com").unwrap()
    }

    #[sqlx::test(fixtures("users", "rooms"))]
    async fn ok_append_to_existing_room(pool: sqlx::SqlitePool) {
        let message = ChatManager::new(&pool)
            .append(ALICE_BOB_ROOM, ALICE, "hello")
            .await
            .unwrap();
        assert_eq!(message.room_id, ALICE_BOB_ROOM);
        assert_eq!(message.user_id, ALICE);
        assert_eq!(message.content, "hello");
        assert!(message.created_at > 0);
    }

    #[sqlx::test(fixtures("users", "rooms"))]
    async fn appended_message_is_committed_on_return(pool: sqlx::SqlitePool) {
        let mut other = pool.acquire().await.unwrap();
        let message = ChatManager::new(&pool)
            .append(ALICE_BOB_ROOM, ALICE, "hello")
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE id = ?")
            .bind(message.id)
            .fetch_one(&mut *other)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test(fixtures("users", "rooms"))]
    async fn created_at_never_falls_behind_the_room(pool: sqlx::SqlitePool) {
        const AHEAD: i64 = 4102444800000;
        sqlx::query(
            "INSERT INTO messages (id, user_id, room_id, content, created_at, updated_at) \
             VALUES (?, ?, ?, 'from the future', ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(BOB)
        .bind(ALICE_BOB_ROOM)
        .bind(AHEAD)
        .bind(AHEAD)
        .execute(&pool)
        .await
        .unwrap();

        let chats = ChatManager::new(&pool);
        let fresh = chats.append(ALICE_BOB_ROOM, ALICE, "now").await.unwrap();
        assert_eq!(fresh.created_at, AHEAD);
        assert_eq!(fresh.updated_at, AHEAD);

        let history = chats.list_since(&alice_bob(), AHEAD - 1).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["from the future", "now"]);
    }

    #[sqlx::test(fixtures("users"))]
    async fn append_to_unknown_room_is_storage_error(pool: sqlx::SqlitePool) {
        let err = ChatManager::new(&pool)
            .append(Uuid::new_v4(), ALICE, "into the void")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
    }

    #[sqlx::test(fixtures("users"))]
    async fn first_contact_creates_room_then_reuses_it(pool: sqlx::SqlitePool) {
        let chats = ChatManager::new(&pool);
        let hi = chats
            .append_by_participants(ALICE, "alice@example.com", "bob@example.com", "hi")
            .await
            .unwrap();
        let reply = chats
            .append_by_participants(BOB, "bob@example.com", "alice@example.com", "hey")
            .await
            .unwrap();
        assert_eq!(hi.room_id, reply.room_id);

        let history = chats.list_since(&alice_bob(), 0).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["hi", "hey"]);
    }

    #[sqlx::test]
    async fn failed_append_keeps_created_room(pool: sqlx::SqlitePool) {
        // no users exist, so the author reference fails after the room is made
        let chats = ChatManager::new(&pool);
        let err = chats
            .append_by_participants(ALICE, "alice@example.com", "bob@example.com", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));

        let room = RoomManager::new(&pool)
            .find_by_participants(&alice_bob())
            .await
            .unwrap();
        assert!(chats.list_since(&alice_bob(), 0).await.unwrap().is_empty());
        assert_eq!(
            RoomManager::new(&pool)
                .find_or_create_by_participants(&alice_bob())
                .await
                .unwrap()
                .id,
            room.id
        );
    }

    #[sqlx::test(fixtures("users", "rooms", "messages"))]
    async fn list_since_is_strictly_after_cursor(pool: sqlx::SqlitePool) {
        let chats = ChatManager::new(&pool);

        let all = chats.list_since(&alice_bob(), 0).await.unwrap();
        let contents: Vec<_> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["hi bob", "hi alice", "how are you?"]);

        let newer = chats.list_since(&alice_bob(), 2000).await.unwrap();
        assert_eq!(newer.len(), 2);
        assert!(newer.iter().all(|m| m.created_at > 2000));

        assert!(chats.list_since(&alice_bob(), 3000).await.unwrap().is_empty());
    }

    #[sqlx::test(fixtures("users", "rooms", "messages"))]
    async fn list_since_is_idempotent(pool: sqlx::SqlitePool) {
        let chats = ChatManager::new(&pool);
        let first = chats.list_since(&alice_bob(), 1000).await.unwrap();
        let second = chats.list_since(&alice_bob(), 1000).await.unwrap();
        assert_eq!(first, second);
    }

    #[sqlx::test(fixtures("users", "rooms", "messages"))]
    async fn polling_with_newest_cursor_has_no_duplicates(pool: sqlx::SqlitePool) {
        let chats = ChatManager::new(&pool);
        let first = chats.list_since(&alice_bob(), 0).await.unwrap();
        let cursor = first.iter().map(|m| m.created_at).max().unwrap();

        let fresh = chats.append(ALICE_BOB_ROOM, BOB, "still there?").await.unwrap();
        let next = chats.list_since(&alice_bob(), cursor).await.unwrap();
        assert_eq!(next, vec![fresh]);
    }

    #[sqlx::test(fixtures("users", "rooms"))]
    async fn empty_room_yields_empty_history(pool: sqlx::SqlitePool) {
        let history = ChatManager::new(&pool).list_since(&alice_bob(), 0).await.unwrap();
        assert!(history.is_empty());
    }

    #[sqlx::test(fixtures("users"))]
    async fn history_without_room_is_room_not_found(pool: sqlx::SqlitePool) {
        let err = ChatManager::new(&pool).list_since(&alice_bob(), 0).await.unwrap_err();
        assert!(matches!(err, Error::RoomNotFound));
    }
}
