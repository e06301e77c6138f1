use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use garde::Validate;
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::user_queries::{self, NewUser, ProfilePatch};
use crate::error::AppError;
use crate::models::api::ApiResponse;
use crate::models::auth::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
    ResetPasswordRequest, TokenKind, UpdateProfileRequest,
};
use crate::models::user::User;
use crate::routes::AuthUser;
use crate::services::usage;

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

fn user_payload(user: &User) -> serde_json::Value {
    json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "profile": {
            "shopName": user.shop_name,
            "address": user.address,
            "phone": user.phone,
        },
        "subscriptionStatus": user.subscription_tier,
        "usageStats": {
            "totalUploads": user.total_uploads,
            "monthlyUploads": user.monthly_uploads,
        },
        "lastLogin": user.last_login,
    })
}

async fn create_session(state: &AppState, user: &User) -> Result<(), AppError> {
    state
        .cache
        .create_session(user.id, &json!({ "loginTime": Utc::now() }))
        .await?;
    Ok(())
}

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    req.validate()?;

    let email = req.email.trim().to_lowercase();
    if user_queries::find_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::Validation("User with this email already exists".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = user_queries::create_user(
        &state.db,
        NewUser {
            name: req.name.trim(),
            email: &email,
            password_hash: &password_hash,
            shop_name: req.shop_name.as_deref().map(str::trim),
            address: req.address.as_deref().map(str::trim),
            phone: req.phone.as_deref().map(str::trim),
        },
    )
    .await?;

    let tokens = state.tokens.issue_pair(&user)?;
    create_session(&state, &user).await?;
    user_queries::record_login(&state.db, user.id).await?;

    tracing::info!(user_id = %user.id, email = %user.email, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            "User registered successfully",
            json!({ "user": user_payload(&user), "tokens": tokens }),
        )),
    ))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    req.validate()?;

    let email = req.email.trim().to_lowercase();
    let user = user_queries::find_by_email(&state.db, &email).await?;

    let Some(user) = user.filter(|u| verify_password(&req.password, &u.password_hash)) else {
        tracing::warn!(security = true, email = %email, "failed login");
        return Err(AppError::Auth("Invalid email or password".into()));
    };

    if !user.is_active {
        return Err(AppError::Auth("Account is deactivated. Please contact support.".into()));
    }

    let tokens = state.tokens.issue_pair(&user)?;
    create_session(&state, &user).await?;
    user_queries::record_login(&state.db, user.id).await?;

    tracing::info!(user_id = %user.id, "login successful");

    Ok(Json(ApiResponse::success_with_message(
        "Login successful",
        json!({ "user": user_payload(&user), "tokens": tokens }),
    )))
}

/// POST /api/v1/auth/refresh-token
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let claims = state.tokens.verify(&req.refresh_token, TokenKind::Refresh)?;

    let user = user_queries::find_by_id(&state.db, claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Auth("User not found or inactive".into()))?;

    let tokens = state.tokens.issue_pair(&user)?;
    create_session(&state, &user).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Token refreshed successfully",
        json!({ "tokens": tokens }),
    )))
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let claims = state.tokens.decode_any(&auth.token)?;
    let ttl = state.tokens.blacklist_ttl_secs(&claims);
    state.cache.blacklist_token(&auth.token, ttl).await?;
    state.cache.destroy_session(auth.user.id).await?;

    tracing::info!(user_id = %auth.user.id, "logged out");

    Ok(Json(ApiResponse::message("Logout successful")))
}

/// GET /api/v1/auth/me
pub async fn me(auth: AuthUser) -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(json!({ "user": user_payload(&auth.user) })))
}

/// PUT /api/v1/auth/profile
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    req.validate()?;

    let user = user_queries::update_profile(
        &state.db,
        auth.user.id,
        ProfilePatch {
            name: req.name.as_deref().map(str::trim),
            shop_name: req.shop_name.as_deref().map(str::trim),
            address: req.address.as_deref().map(str::trim),
            phone: req.phone.as_deref().map(str::trim),
        },
    )
    .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Profile updated successfully",
        json!({ "user": user_payload(&user) }),
    )))
}

/// PUT /api/v1/auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    req.validate()?;

    if !verify_password(&req.current_password, &auth.user.password_hash) {
        return Err(AppError::Validation("Current password is incorrect".into()));
    }

    let new_hash = hash_password(&req.new_password)?;
    user_queries::update_password_hash(&state.db, auth.user.id, &new_hash).await?;

    // Existing sessions are no longer trustworthy.
    state.cache.destroy_session(auth.user.id).await?;

    tracing::info!(user_id = %auth.user.id, "password changed");

    Ok(Json(ApiResponse::message("Password changed successfully. Please log in again.")))
}

/// POST /api/v1/auth/forgot-password
///
/// Always answers 200 so the endpoint cannot be used to probe which
/// emails are registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    req.validate()?;

    let email = req.email.trim().to_lowercase();
    if let Some(user) = user_queries::find_by_email(&state.db, &email).await? {
        let reset_token = Uuid::new_v4().to_string();
        state.cache.store_reset_token(&reset_token, user.id).await?;
        // Mail delivery is an external concern; the token is logged for
        // the operator until an outbound channel exists.
        tracing::info!(user_id = %user.id, reset_token = %reset_token, "password reset token issued");
    }

    Ok(Json(ApiResponse::message(
        "If that email is registered, a password reset link has been sent.",
    )))
}

/// POST /api/v1/auth/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    req.validate()?;

    let user_id = state
        .cache
        .take_reset_token(&req.token)
        .await?
        .ok_or_else(|| AppError::Auth("Invalid or expired reset token".into()))?;

    let new_hash = hash_password(&req.new_password)?;
    user_queries::update_password_hash(&state.db, user_id, &new_hash).await?;
    state.cache.destroy_session(user_id).await?;

    tracing::info!(user_id = %user_id, "password reset completed");

    Ok(Json(ApiResponse::message("Password reset successfully. Please log in.")))
}

/// GET /api/v1/auth/usage-stats
pub async fn usage_stats(auth: AuthUser) -> Json<ApiResponse<serde_json::Value>> {
    let now = Utc::now();
    let tier = auth.user.tier();
    let snapshot = auth.user.usage_snapshot();
    let decision = usage::can_upload(snapshot, tier, now);

    Json(ApiResponse::success(json!({
        "monthlyUploads": decision.current_usage,
        "totalUploads": snapshot.total_uploads,
        "remainingUploads": usage::remaining_uploads(snapshot, tier, now),
        "currentLimit": decision.limit,
        "subscriptionStatus": auth.user.subscription_tier,
    })))
}
