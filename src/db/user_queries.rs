use sqlx::PgPool;
use uuid::Uuid;

use crate::models::user::{UsageSnapshot, User};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, is_active, \
     shop_name, address, phone, subscription_tier, total_uploads, monthly_uploads, \
     last_month_reset, last_login, login_count, created_at, updated_at";

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub shop_name: Option<&'a str>,
    pub address: Option<&'a str>,
    pub phone: Option<&'a str>,
}

/// Insert a new account. Fails on duplicate email (unique index).
pub async fn create_user(pool: &PgPool, new: NewUser<'_>) -> Result<User, sqlx::Error> {
    let sql = format!(
        "INSERT INTO users (name, email, password_hash, shop_name, address, phone)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(new.name)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.shop_name)
        .bind(new.address)
        .bind(new.phone)
        .fetch_one(pool)
        .await
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    sqlx::query_as::<_, User>(&sql).bind(email).fetch_optional(pool).await
}

pub async fn find_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    sqlx::query_as::<_, User>(&sql).bind(user_id).fetch_optional(pool).await
}

/// Stamp a successful login.
pub async fn record_login(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users
         SET last_login = NOW(), login_count = login_count + 1, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub struct ProfilePatch<'a> {
    pub name: Option<&'a str>,
    pub shop_name: Option<&'a str>,
    pub address: Option<&'a str>,
    pub phone: Option<&'a str>,
}

/// Partial profile update; NULL arguments leave the column untouched.
pub async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    patch: ProfilePatch<'_>,
) -> Result<User, sqlx::Error> {
    let sql = format!(
        "UPDATE users
         SET name = COALESCE($2, name),
             shop_name = COALESCE($3, shop_name),
             address = COALESCE($4, address),
             phone = COALESCE($5, phone),
             updated_at = NOW()
         WHERE id = $1
         RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .bind(patch.name)
        .bind(patch.shop_name)
        .bind(patch.address)
        .bind(patch.phone)
        .fetch_one(pool)
        .await
}

pub async fn update_password_hash(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persist the outcome of the pure usage computation in one statement.
pub async fn save_usage(
    pool: &PgPool,
    user_id: Uuid,
    usage: &UsageSnapshot,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users
         SET total_uploads = $2, monthly_uploads = $3, last_month_reset = $4, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(user_id)
    .bind(usage.total_uploads)
    .bind(usage.monthly_uploads)
    .bind(usage.last_month_reset)
    .execute(pool)
    .await?;
    Ok(())
}

/// System-wide account counters for the admin dashboard.
pub async fn count_users(pool: &PgPool) -> Result<(i64, i64), sqlx::Error> {
    let row: (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active) FROM users",
    )
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Latest registrations, for the admin dashboard.
pub async fn recent_users(pool: &PgPool, limit: i64) -> Result<Vec<User>, sqlx::Error> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1");
    sqlx::query_as::<_, User>(&sql).bind(limit).fetch_all(pool).await
}

/// Heaviest uploaders, for the admin dashboard.
pub async fn top_users_by_uploads(pool: &PgPool, limit: i64) -> Result<Vec<User>, sqlx::Error> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY total_uploads DESC LIMIT $1");
    sqlx::query_as::<_, User>(&sql).bind(limit).fetch_all(pool).await
}
