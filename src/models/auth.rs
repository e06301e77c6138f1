use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims for access and refresh tokens. `kind` distinguishes the
/// two so a refresh token can never authenticate a request directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Access/refresh pair returned by register, login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub auth_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[garde(length(min = 2, max = 50))]
    pub name: String,

    #[garde(email)]
    pub email: String,

    #[garde(length(min = 6, max = 128))]
    pub password: String,

    #[garde(length(max = 100))]
    pub shop_name: Option<String>,

    #[garde(length(max = 200))]
    pub address: Option<String>,

    #[garde(length(max = 20))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(email)]
    pub email: String,

    #[garde(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[garde(length(min = 2, max = 50))]
    pub name: Option<String>,

    #[garde(length(max = 100))]
    pub shop_name: Option<String>,

    #[garde(length(max = 200))]
    pub address: Option<String>,

    #[garde(length(max = 20))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[garde(length(min = 1))]
    pub current_password: String,

    #[garde(length(min = 6, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[garde(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[garde(length(min = 1))]
    pub token: String,

    #[garde(length(min = 6, max = 128))]
    pub new_password: String,
}
