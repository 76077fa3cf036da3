use async_trait::async_trait;
use uuid::Uuid;

use super::{Error, Result, StorageContext, User, UserDirectory};

const SEARCH_LIMIT: i64 = 20;

#[derive(Clone)]
pub struct UserManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> UserManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

impl UserManager<'_> {
    pub async fn persist_new_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query(concat!(
            "INSERT INTO users (id, name, email, password_hash, created_at, updated_at) ",
            "VALUES (?, ?, ?, ?, ",
            now_millis!(),
            ", ",
            now_millis!(),
            ")"
        ))
        .bind(id)
        .bind(name)
        .bind(email.trim())
        .bind(password_hash)
        .execute(self.pool)
        .await?;

        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool)
            .await
    }
}

fn like_prefix(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}%")
}

#[async_trait]
impl<'a> UserDirectory for UserManager<'a> {
    async fn resolve(&self, email: &str) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email.trim())
            .fetch_optional(self.pool)
            .await
            .storage(|| format!("look up user {email}"))?
            .ok_or_else(|| Error::UserNotFound(email.to_owned()))
    }

    async fn search(&self, term: &str) -> Result<Vec<User>> {
        let pattern = like_prefix(term);
        sqlx::query_as::<_, User>(
            "SELECT * FROM users \
             WHERE name LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\' \
             ORDER BY name, email LIMIT ?2",
        )
        .bind(pattern)
        .bind(SEARCH_LIMIT)
        .fetch_all(self.pool)
        .await
        .storage(|| format!("search users matching {term:?}"))
    }
}
