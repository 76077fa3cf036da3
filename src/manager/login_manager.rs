use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use super::{user_manager::UserManager, User};

#[derive(Clone)]
pub struct LoginManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> LoginManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("email already exists")]
    EmailTaken,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("no record found")]
    NotRegistered,
    #[error("incorrect email or password")]
    WrongPassword,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Hash(e.to_string()))
}

fn verify_password(password: &str, password_hash: &str) -> Result<bool, Error> {
    let parsed = PasswordHash::new(password_hash).map_err(|e| Error::Hash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(Error::Hash(e.to_string())),
    }
}

impl LoginManager<'_> {
    pub async fn get_user(&self, email: &str, password: &str) -> Result<User, Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email.trim())
            .fetch_optional(self.pool)
            .await?
            .ok_or(Error::NotRegistered)?;

        if verify_password(password, &user.password_hash)? {
            Ok(user)
        } else {
            Err(Error::WrongPassword)
        }
    }

    pub async fn new_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<User, Error> {
        if password != confirm_password {
            return Err(Error::PasswordMismatch);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
            .bind(email.trim())
            .fetch_one(self.pool)
            .await?;
        if exists {
            return Err(Error::EmailTaken);
        }

        let password_hash = hash_password(password)?;
        match UserManager::new(self.pool)
            .persist_new_user(name, email, &password_hash)
            .await
        {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "registered user");
                Ok(user)
            }
            // lost a registration race for the same email
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(Error::EmailTaken),
            Err(e) => Err(e.into()),
        }
    }
}
