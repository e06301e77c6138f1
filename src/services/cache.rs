use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

fn session_key(user_id: Uuid) -> String {
    format!("bill_check:session:{user_id}")
}

fn blacklist_key(token: &str) -> String {
    format!("bill_check:blacklist:{token}")
}

fn reset_key(token: &str) -> String {
    format!("bill_check:pwreset:{token}")
}

const SESSION_TTL_SECS: i64 = 24 * 60 * 60;
const RESET_TTL_SECS: i64 = 60 * 60;

/// Redis-backed cache for sessions, the token blacklist and
/// password-reset tokens.
pub struct CacheClient {
    client: redis::Client,
}

impl CacheClient {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(CacheError::Redis)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client.get_multiplexed_async_connection().await.map_err(CacheError::Redis)
    }

    async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: i64,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(value).map_err(CacheError::Serialize)?;
        conn.set_ex::<_, _, ()>(key, payload, ttl_secs.max(1) as u64)
            .await
            .map_err(CacheError::Redis)?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.get(key).await.map_err(CacheError::Redis)?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p).map_err(CacheError::Serialize)?)),
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await.map_err(CacheError::Redis)?;
        Ok(())
    }

    // ── Sessions ─────────────────────────────────────────────────────

    /// Create or replace the user's session record.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        session: &serde_json::Value,
    ) -> Result<(), CacheError> {
        self.set_json(&session_key(user_id), session, SESSION_TTL_SECS).await
    }

    pub async fn get_session(&self, user_id: Uuid) -> Result<Option<serde_json::Value>, CacheError> {
        self.get_json(&session_key(user_id)).await
    }

    /// Destroy the session, e.g. at logout or password change.
    pub async fn destroy_session(&self, user_id: Uuid) -> Result<(), CacheError> {
        self.del(&session_key(user_id)).await
    }

    // ── Token blacklist ──────────────────────────────────────────────

    /// Blacklist a token for the remainder of its lifetime.
    pub async fn blacklist_token(&self, token: &str, ttl_secs: i64) -> Result<(), CacheError> {
        if ttl_secs <= 0 {
            return Ok(()); // already expired, nothing to do
        }
        self.set_json(&blacklist_key(token), &true, ttl_secs).await
    }

    pub async fn is_token_blacklisted(&self, token: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(blacklist_key(token)).await.map_err(CacheError::Redis)?;
        Ok(exists)
    }

    // ── Password reset tokens ────────────────────────────────────────

    /// Store a one-hour password-reset token pointing at the user.
    pub async fn store_reset_token(&self, token: &str, user_id: Uuid) -> Result<(), CacheError> {
        self.set_json(&reset_key(token), &user_id, RESET_TTL_SECS).await
    }

    /// Consume a reset token, returning its user. One-shot: the token is
    /// deleted on read.
    pub async fn take_reset_token(&self, token: &str) -> Result<Option<Uuid>, CacheError> {
        let key = reset_key(token);
        let user_id: Option<Uuid> = self.get_json(&key).await?;
        if user_id.is_some() {
            self.del(&key).await?;
        }
        Ok(user_id)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await.map_err(CacheError::Redis)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
