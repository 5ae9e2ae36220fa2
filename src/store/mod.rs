mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Boolean participant flags that moderation can toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantFlag {
    Approved,
    Muted,
    VideoOff,
    ChatBlocked,
    OnStage,
}

impl ParticipantFlag {
    fn column(self) -> &'static str {
        match self {
            ParticipantFlag::Approved => "is_approved",
            ParticipantFlag::Muted => "is_muted",
            ParticipantFlag::VideoOff => "is_video_off",
            ParticipantFlag::ChatBlocked => "is_chat_blocked",
            ParticipantFlag::OnStage => "is_on_stage",
        }
    }
}

/// Parameters for a join, evaluated inside the store's transaction.
#[derive(Debug, Clone)]
pub struct JoinRequest<'a> {
    pub room_id: &'a str,
    pub user_id: &'a str,
    /// Approval state for a first-time participant.
    pub approved: bool,
    pub max_participants: u32,
    pub now: DateTime<Utc>,
}

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn create_user_with_passkey(&self, user: &User, passkey: &PasskeyCredential) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn list_users(&self) -> Result<Vec<User>>;
    fn update_user(&self, user: &User) -> Result<()>;
    fn set_refresh_token(&self, user_id: &str, refresh_token: &str) -> Result<()>;
    /// Removes the user together with their memberships, permissions,
    /// passkeys, revocations and the rooms they created.
    fn delete_user(&self, id: &str) -> Result<bool>;

    // Revocation operations
    /// Returns false if the identifier was already revoked.
    fn revoke_token(&self, revoked: &RevokedToken) -> Result<bool>;
    fn is_token_revoked(&self, token_id: &str) -> Result<bool>;
    fn sweep_revoked_tokens(&self, now: DateTime<Utc>) -> Result<usize>;

    // Passkey operations
    fn create_passkey(&self, passkey: &PasskeyCredential) -> Result<()>;
    fn get_passkey_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<PasskeyCredential>>;
    fn list_user_passkeys(&self, user_id: &str) -> Result<Vec<PasskeyCredential>>;
    /// Stores `counter` only if it is strictly greater than the stored value.
    fn advance_passkey_counter(
        &self,
        id: &str,
        counter: u32,
        used_at: DateTime<Utc>,
    ) -> Result<bool>;
    fn flag_passkey_clone(&self, id: &str) -> Result<()>;
    fn delete_passkey(&self, user_id: &str, id: &str) -> Result<bool>;

    // Room operations
    /// Inserts the room, its creator's participant row and full permissions atomically.
    fn create_room(
        &self,
        room: &Room,
        owner: &RoomParticipant,
        permissions: &RoomPermissions,
    ) -> Result<()>;
    fn get_room(&self, id: &str) -> Result<Option<Room>>;
    fn get_room_by_name(&self, name: &str) -> Result<Option<Room>>;
    fn list_rooms(&self) -> Result<Vec<Room>>;
    fn list_rooms_created_by(&self, user_id: &str) -> Result<Vec<Room>>;
    fn list_rooms_participated_by(&self, user_id: &str) -> Result<Vec<Room>>;
    fn update_room_settings(&self, room_id: &str, settings: &RoomSettings) -> Result<()>;
    /// Deletes permissions, then participants, then the room in one transaction.
    fn delete_room(&self, room_id: &str) -> Result<bool>;
    fn deactivate_expired_rooms(&self, now: DateTime<Utc>) -> Result<usize>;

    // Participant operations
    fn join_room(&self, req: &JoinRequest<'_>) -> Result<RoomParticipant>;
    fn leave_room(&self, room_id: &str, user_id: &str, now: DateTime<Utc>) -> Result<bool>;
    fn kick_participant(&self, room_id: &str, user_id: &str, now: DateTime<Utc>) -> Result<bool>;
    fn set_participant_flag(
        &self,
        room_id: &str,
        user_id: &str,
        flag: ParticipantFlag,
        value: bool,
    ) -> Result<bool>;
    fn get_participant(&self, room_id: &str, user_id: &str) -> Result<Option<RoomParticipant>>;
    fn list_active_participants(&self, room_id: &str) -> Result<Vec<ParticipantProfile>>;

    // Permission operations
    fn get_permissions(&self, room_id: &str, user_id: &str) -> Result<Option<RoomPermissions>>;
    fn upsert_permissions(&self, permissions: &RoomPermissions) -> Result<()>;
}
