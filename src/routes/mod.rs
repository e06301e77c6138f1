use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::app_state::AppState;
use crate::db::user_queries;
use crate::error::AppError;
use crate::models::auth::TokenKind;
use crate::models::user::User;

pub mod auth;
pub mod dashboard;
pub mod health;
pub mod metrics;
pub mod receipts;

/// Authenticated caller, extracted from the bearer token. Rejects
/// missing, malformed, expired and blacklisted tokens as well as
/// inactive accounts.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Auth("Access denied. No valid token provided.".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Auth("Access denied. No valid token provided.".into()))?;

        if state.cache.is_token_blacklisted(token).await? {
            return Err(AppError::Auth("Token has been invalidated.".into()));
        }

        let claims = state.tokens.verify(token, TokenKind::Access)?;

        let user = user_queries::find_by_id(&state.db, claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Auth("User no longer exists or is inactive.".into()))?;

        Ok(AuthUser { user, token: token.to_string() })
    }
}

/// Authenticated caller holding the admin role.
pub struct AdminUser {
    pub user: User,
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser { user, .. } = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!(security = true, user_id = %user.id, "non-admin attempted admin endpoint");
            return Err(AppError::Forbidden("Insufficient permissions.".into()));
        }
        Ok(AdminUser { user })
    }
}
