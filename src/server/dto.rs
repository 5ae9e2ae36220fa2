use serde::{Deserialize, Serialize};

use crate::types::{PasskeyCredential, User};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct GuestLoginRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct PasskeySignupRequest {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct FederatedCallbackRequest {
    pub provider: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub passkeys: Vec<PasskeyCredential>,
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    pub room_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UserStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserRolesRequest {
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self { status: "ok" }
    }
}
