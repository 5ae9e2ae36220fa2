use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub provider: String,
    pub roles: Vec<Role>,
    pub is_active: bool,
    #[serde(skip)]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn has_role(&self, required: Role) -> bool {
        super::roles_satisfy(&self.roles, required)
    }
}

/// The authenticated identity carried inside an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub provider: String,
    pub roles: Vec<Role>,
}

impl Principal {
    #[must_use]
    pub fn has_role(&self, required: Role) -> bool {
        super::roles_satisfy(&self.roles, required)
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            provider: user.provider.clone(),
            roles: user.roles.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedToken {
    pub token_id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasskeyCredential {
    pub id: String,
    pub user_id: String,
    #[serde(with = "b64url")]
    pub credential_id: Vec<u8>,
    #[serde(skip)]
    pub public_key: Vec<u8>,
    pub algorithm: i64,
    pub counter: u32,
    pub name: String,
    pub clone_suspected: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomMode {
    #[default]
    Standard,
    Clubhouse,
}

impl RoomMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RoomMode::Standard => "standard",
            RoomMode::Clubhouse => "clubhouse",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<RoomMode> {
        match s {
            "standard" => Some(RoomMode::Standard),
            "clubhouse" => Some(RoomMode::Clubhouse),
            _ => None,
        }
    }
}

impl fmt::Display for RoomMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    pub allow_chat: bool,
    pub allow_video: bool,
    pub allow_audio: bool,
    pub require_approval: bool,
    pub e2ee: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            allow_chat: true,
            allow_video: true,
            allow_audio: true,
            require_approval: false,
            e2ee: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub admin_id: String,
    pub is_active: bool,
    pub is_public: bool,
    pub mode: RoomMode,
    pub max_participants: u32,
    pub settings: RoomSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Room {
    /// A room is joinable while active and not past its expiry.
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomParticipant {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_approved: bool,
    pub is_muted: bool,
    pub is_video_off: bool,
    pub is_chat_blocked: bool,
    pub is_banned: bool,
    pub is_on_stage: bool,
}

/// Participant row joined with the user's public profile.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantProfile {
    #[serde(flatten)]
    pub participant: RoomParticipant,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPermissions {
    pub room_id: String,
    pub user_id: String,
    pub is_admin: bool,
    pub can_kick: bool,
    pub can_mute_audio: bool,
    pub can_disable_video: bool,
    pub can_chat: bool,
}

impl RoomPermissions {
    /// The grant given to a room's creator.
    #[must_use]
    pub fn full(room_id: &str, user_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            is_admin: true,
            can_kick: true,
            can_mute_audio: true,
            can_disable_video: true,
            can_chat: true,
        }
    }

    /// What an absent permissions row means: no elevated capability.
    #[must_use]
    pub fn none(room_id: &str, user_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            is_admin: false,
            can_kick: false,
            can_mute_audio: false,
            can_disable_video: false,
            can_chat: false,
        }
    }
}

mod b64url {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
