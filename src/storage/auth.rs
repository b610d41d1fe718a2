use anyhow::Context;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand_core::OsRng;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Session, UserId};

/// Minimum password length accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

pub const DEFAULT_SESSION_DAYS: i64 = 7;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered: {0}")]
    EmailAlreadyRegistered(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Password must be at least 6 characters")]
    WeakPassword,

    #[error("Auth backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Issues sessions bound to a user identity.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The current session, if one exists and has not expired.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Register a new user and sign them in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(
    password: &str,
    stored_hash: &str,
) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(stored_hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(AuthError::InvalidEmail(email))
    }
}

/// Local auth provider: users with argon2 hashes and one current session
/// per database, in the same SQLite file as the ledger.
pub struct SqliteAuthProvider {
    pool: SqlitePool,
    session_ttl: Duration,
}

impl SqliteAuthProvider {
    /// Tables come from the record store's migrations.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            session_ttl: Duration::days(DEFAULT_SESSION_DAYS),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    async fn start_session(&self, user_id: UserId, email: String) -> Result<Session, AuthError> {
        let session = Session {
            user_id,
            email,
            token: Uuid::new_v4().simple().to_string(),
            expires_at: Utc::now() + self.session_ttl,
        };

        sqlx::query(
            r#"
            INSERT INTO current_session (slot, user_id, token, expires_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT (slot) DO UPDATE
            SET user_id = excluded.user_id, token = excluded.token, expires_at = excluded.expires_at
            "#,
        )
        .bind(session.user_id.to_string())
        .bind(&session.token)
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to store session")?;

        info!(user = %session.email, "Signed in");
        Ok(session)
    }
}

#[async_trait]
impl AuthProvider for SqliteAuthProvider {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let row = sqlx::query(
            r#"
            SELECT s.user_id, u.email, s.token, s.expires_at
            FROM current_session s
            JOIN users u ON u.id = s.user_id
            WHERE s.slot = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read session")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let user_id: String = row.get("user_id");
        let expires_at: String = row.get("expires_at");
        let session = Session {
            user_id: Uuid::parse_str(&user_id).context("Invalid user ID")?,
            email: row.get("email"),
            token: row.get("token"),
            expires_at: DateTime::parse_from_rfc3339(&expires_at)
                .context("Invalid session expiry")?
                .with_timezone(&Utc),
        };

        if session.is_expired() {
            debug!(user = %session.email, "Stored session expired");
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let existing = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up user")?;
        if existing.is_some() {
            return Err(AuthError::EmailAlreadyRegistered(email));
        }

        let password_hash =
            hash_password(password).map_err(|e| anyhow::anyhow!("hash error: {e}"))?;
        let user_id = Uuid::new_v4();

        sqlx::query("INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
            .bind(user_id.to_string())
            .bind(&email)
            .bind(&password_hash)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to create user")?;

        info!(user = %email, "Registered user");
        self.start_session(user_id, email).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = email.trim().to_lowercase();
        let row = sqlx::query("SELECT id, password_hash FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up user")?;

        let Some(row) = row else {
            return Err(AuthError::InvalidCredentials);
        };

        let password_hash: String = row.get("password_hash");
        let valid = verify_password(password, &password_hash)
            .map_err(|e| anyhow::anyhow!("verify error: {e}"))?;
        if !valid {
            return Err(AuthError::InvalidCredentials);
        }

        let user_id: String = row.get("id");
        let user_id = Uuid::parse_str(&user_id).context("Invalid user ID")?;
        self.start_session(user_id, email).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM current_session WHERE slot = 1")
            .execute(&self.pool)
            .await
            .context("Failed to clear session")?;
        info!("Signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Vet@Clinic.COM ").unwrap(),
            "vet@clinic.com"
        );
        for bad in ["", "vet", "@clinic.com", "vet@clinic", "vet@.com", "vet@clinic."] {
            assert!(
                matches!(normalize_email(bad), Err(AuthError::InvalidEmail(_))),
                "{bad} should be rejected"
            );
        }
    }
}
