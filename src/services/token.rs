use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Validation};
use uuid::Uuid;

use crate::models::auth::{Claims, TokenKind, TokenPair};
use crate::models::user::User;

/// Issues and verifies the HMAC-signed access and refresh tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    fn issue(&self, user: &User, kind: TokenKind) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            kind,
            iat: now,
            exp: now + ttl,
        };
        encode(&jsonwebtoken::Header::default(), &claims, &self.encoding)
            .map_err(TokenError::Encode)
    }

    /// Issue the access/refresh pair handed out at register and login.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            auth_token: self.issue(user, TokenKind::Access)?,
            refresh_token: self.issue(user, TokenKind::Refresh)?,
            expires_in: self.access_ttl_secs,
        })
    }

    /// Verify signature and expiry, then check the token kind matches.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        if data.claims.kind != expected {
            return Err(TokenError::WrongKind);
        }
        Ok(data.claims)
    }

    /// Seconds a blacklist entry for this token must live: the remaining
    /// time until its expiry, or zero when it is already expired.
    pub fn blacklist_ttl_secs(&self, claims: &Claims) -> i64 {
        (claims.exp - Utc::now().timestamp()).max(0)
    }

    /// Decode without kind enforcement, for logout blacklisting.
    pub fn decode_any(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;
        Ok(data.claims)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Encode(jsonwebtoken::errors::Error),

    #[error("Invalid token.")]
    Invalid,

    #[error("Token expired. Please log in again.")]
    Expired,

    #[error("Invalid token type.")]
    WrongKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Asha".into(),
            email: "asha@example.test".into(),
            password_hash: "x".into(),
            role: "user".into(),
            is_active: true,
            shop_name: None,
            address: None,
            phone: None,
            subscription_tier: "free".into(),
            total_uploads: 0,
            monthly_uploads: 0,
            last_month_reset: Utc::now(),
            last_login: None,
            login_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service() -> TokenService {
        TokenService::new("test-secret", 3600, 7200)
    }

    #[test]
    fn access_token_round_trips() {
        let svc = service();
        let user = test_user();
        let pair = svc.issue_pair(&user).unwrap();

        let claims = svc.verify(&pair.auth_token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn refresh_token_cannot_authenticate() {
        let svc = service();
        let pair = svc.issue_pair(&test_user()).unwrap();
        let err = svc.verify(&pair.refresh_token, TokenKind::Access).unwrap_err();
        assert!(matches!(err, TokenError::WrongKind));
    }

    #[test]
    fn tampered_token_rejected() {
        let svc = service();
        let pair = svc.issue_pair(&test_user()).unwrap();
        let other = TokenService::new("different-secret", 3600, 7200);
        assert!(matches!(
            other.verify(&pair.auth_token, TokenKind::Access),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn blacklist_ttl_tracks_remaining_life() {
        let svc = service();
        let pair = svc.issue_pair(&test_user()).unwrap();
        let claims = svc.decode_any(&pair.auth_token).unwrap();
        let ttl = svc.blacklist_ttl_secs(&claims);
        assert!(ttl > 3590 && ttl <= 3600);
    }
}
