use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::media::{MediaGrant, MediaPermission, MediaService, TrackSource};
use crate::error::{Error, Result};
use crate::store::{JoinRequest, ParticipantFlag, Store};
use crate::types::{
    ParticipantProfile, Principal, Role, Room, RoomMode, RoomParticipant, RoomPermissions,
    RoomSettings, generate_room_name, normalize_room_name, validate_room_name,
};

pub const DEFAULT_MAX_PARTICIPANTS: u32 = 20;
pub const MAX_PARTICIPANTS_LIMIT: u32 = 1000;
const ROOM_LIFETIME_HOURS: i64 = 24;
const NAME_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateRoom {
    pub name: Option<String>,
    pub is_public: bool,
    pub mode: RoomMode,
    pub max_participants: Option<u32>,
    pub settings: Option<RoomSettings>,
}

/// Result of a successful join: local membership plus the media grant.
#[derive(Debug, Clone, Serialize)]
pub struct JoinedRoom {
    pub room: Room,
    pub participant: RoomParticipant,
    pub token: String,
    pub media_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminGrant {
    pub room: Room,
    pub token: String,
    pub media_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRooms {
    pub created: Vec<Room>,
    pub participated: Vec<Room>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct PermissionUpdate {
    pub is_admin: bool,
    pub can_kick: bool,
    pub can_mute_audio: bool,
    pub can_disable_video: bool,
    pub can_chat: bool,
}

/// What `participant` may publish in `room`. A missing permissions row grants
/// nothing elevated; chat falls back to the room setting.
#[must_use]
pub fn media_permission(
    room: &Room,
    participant: &RoomParticipant,
    permissions: Option<&RoomPermissions>,
) -> MediaPermission {
    let settings = &room.settings;

    let mut sources = Vec::new();
    if settings.allow_audio && !participant.is_muted {
        sources.push(TrackSource::Microphone);
    }
    if settings.allow_video && !participant.is_video_off {
        sources.push(TrackSource::Camera);
        sources.push(TrackSource::ScreenShare);
    }

    let approved = participant.is_approved || !settings.require_approval;
    let staged = room.mode != RoomMode::Clubhouse || participant.is_on_stage;

    MediaPermission {
        can_publish: approved && staged && !sources.is_empty(),
        can_subscribe: true,
        can_publish_data: settings.allow_chat
            && !participant.is_chat_blocked
            && permissions.is_none_or(|p| p.can_chat),
        can_publish_sources: sources,
    }
}

/// Owns room naming, creation, membership transitions, moderation and expiry.
pub struct RoomRegistry {
    store: Arc<dyn Store>,
    media: Arc<dyn MediaService>,
    grant_ttl: Duration,
    media_url: String,
}

impl RoomRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        media: Arc<dyn MediaService>,
        grant_ttl: Duration,
        media_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            media,
            grant_ttl,
            media_url: media_url.into(),
        }
    }

    fn room(&self, room_id: &str) -> Result<Room> {
        self.store.get_room(room_id)?.ok_or(Error::NotFound("room"))
    }

    fn participant(&self, room_id: &str, user_id: &str) -> Result<RoomParticipant> {
        self.store
            .get_participant(room_id, user_id)?
            .ok_or(Error::NotFound("participant"))
    }

    /// Passes when the actor's room permissions satisfy `check` or the actor
    /// is a global admin.
    fn require(
        &self,
        room: &Room,
        actor: &Principal,
        check: impl Fn(&RoomPermissions) -> bool,
        action: &str,
    ) -> Result<()> {
        if actor.has_role(Role::Admin) {
            return Ok(());
        }
        let allowed = self
            .store
            .get_permissions(&room.id, &actor.user_id)?
            .is_some_and(|p| check(&p));
        if !allowed {
            tracing::debug!(
                room_id = %room.id,
                user_id = %actor.user_id,
                action,
                "room action denied"
            );
            return Err(Error::Forbidden(format!("not allowed to {action} in this room")));
        }
        Ok(())
    }

    /// Pushes the participant's current capabilities to the media server if
    /// they are connected.
    async fn sync_media(&self, room: &Room, user_id: &str) -> Result<()> {
        let participant = self.participant(&room.id, user_id)?;
        if !participant.is_active {
            return Ok(());
        }
        let permissions = self.store.get_permissions(&room.id, user_id)?;
        let permission = media_permission(room, &participant, permissions.as_ref());
        self.media
            .update_participant(&room.name, user_id, &permission)
            .await
    }

    fn allocate_name(&self, requested: Option<&str>) -> Result<String> {
        if let Some(requested) = requested.map(str::trim).filter(|n| !n.is_empty()) {
            let name = normalize_room_name(requested);
            validate_room_name(&name)?;
            if self.store.get_room_by_name(&name)?.is_some() {
                return Err(Error::RoomNameTaken);
            }
            return Ok(name);
        }

        for _ in 0..NAME_ATTEMPTS {
            let name = generate_room_name();
            validate_room_name(&name)?;
            if self.store.get_room_by_name(&name)?.is_none() {
                return Ok(name);
            }
        }
        Err(Error::Internal("could not allocate a unique room name".into()))
    }

    pub async fn create_room(&self, actor: &Principal, req: CreateRoom) -> Result<Room> {
        if !actor.has_role(Role::User) {
            return Err(Error::Forbidden("guests cannot create rooms".into()));
        }

        let name = self.allocate_name(req.name.as_deref())?;
        let max_participants = req.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS);
        if !(1..=MAX_PARTICIPANTS_LIMIT).contains(&max_participants) {
            return Err(Error::Validation(format!(
                "max_participants must be between 1 and {MAX_PARTICIPANTS_LIMIT}"
            )));
        }

        let mut settings = req.settings.unwrap_or_default();
        if req.mode == RoomMode::Clubhouse {
            settings.allow_video = false;
        }

        let now = Utc::now();
        let room = Room {
            id: Uuid::new_v4().to_string(),
            name,
            created_by: actor.user_id.clone(),
            admin_id: actor.user_id.clone(),
            is_active: true,
            is_public: req.is_public,
            mode: req.mode,
            max_participants,
            settings,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::hours(ROOM_LIFETIME_HOURS),
        };
        let owner = RoomParticipant {
            id: Uuid::new_v4().to_string(),
            room_id: room.id.clone(),
            user_id: actor.user_id.clone(),
            joined_at: now,
            left_at: None,
            is_active: true,
            is_approved: true,
            is_muted: false,
            is_video_off: false,
            is_chat_blocked: false,
            is_banned: false,
            is_on_stage: true,
        };
        let permissions = RoomPermissions::full(&room.id, &actor.user_id);

        self.media.create_room(&room.name, max_participants).await?;

        if let Err(e) = self.store.create_room(&room, &owner, &permissions) {
            // A lost name race leaves the media room to whoever committed it.
            if !matches!(e, Error::RoomNameTaken) {
                if let Err(cleanup) = self.media.delete_room(&room.name).await {
                    tracing::warn!(
                        room = %room.name,
                        error = %cleanup,
                        "failed to remove orphaned media room"
                    );
                }
            }
            return Err(e);
        }

        tracing::info!(
            room_id = %room.id,
            room = %room.name,
            user_id = %actor.user_id,
            "room created"
        );
        Ok(room)
    }

    pub fn join_room(&self, actor: &Principal, name: &str) -> Result<JoinedRoom> {
        let name = normalize_room_name(name);
        let room = self
            .store
            .get_room_by_name(&name)?
            .ok_or(Error::NotFound("room"))?;

        let now = Utc::now();
        if !room.is_open_at(now) {
            return Err(Error::RoomInactive);
        }

        let participant = self
            .store
            .join_room(&JoinRequest {
                room_id: &room.id,
                user_id: &actor.user_id,
                approved: !room.settings.require_approval,
                max_participants: room.max_participants,
                now,
            })
            .inspect_err(|e| {
                if matches!(e, Error::Banned) {
                    tracing::warn!(
                        security = true,
                        room_id = %room.id,
                        user_id = %actor.user_id,
                        "banned user attempted to rejoin"
                    );
                }
            })?;

        let permissions = self.store.get_permissions(&room.id, &actor.user_id)?;
        let grant = MediaGrant {
            identity: actor.user_id.clone(),
            name: actor.name.clone(),
            room: room.name.clone(),
            room_admin: permissions.as_ref().is_some_and(|p| p.is_admin),
            permission: media_permission(&room, &participant, permissions.as_ref()),
        };
        let token = self.media.mint_grant(&grant, self.grant_ttl)?;

        tracing::info!(room_id = %room.id, user_id = %actor.user_id, "joined room");
        Ok(JoinedRoom {
            room,
            participant,
            token,
            media_url: self.media_url.clone(),
        })
    }

    pub fn leave_room(&self, actor: &Principal, room_id: &str) -> Result<()> {
        if !self.store.leave_room(room_id, &actor.user_id, Utc::now())? {
            return Err(Error::NotFound("participant"));
        }
        tracing::info!(room_id = %room_id, user_id = %actor.user_id, "left room");
        Ok(())
    }

    /// Removes and bans `target`. The ban survives every later join attempt.
    pub async fn kick(&self, actor: &Principal, room_id: &str, target: &str) -> Result<()> {
        let room = self.room(room_id)?;
        self.require(&room, actor, |p| p.can_kick, "kick participants")?;
        if target == room.created_by {
            return Err(Error::Forbidden("the room creator cannot be kicked".into()));
        }

        let was_active = self.participant(room_id, target)?.is_active;
        self.store.kick_participant(room_id, target, Utc::now())?;
        tracing::info!(
            room_id = %room_id,
            user_id = %target,
            by = %actor.user_id,
            "participant kicked"
        );

        if was_active {
            self.media.remove_participant(&room.name, target).await?;
        }
        Ok(())
    }

    async fn set_flag(
        &self,
        room: &Room,
        target: &str,
        flag: ParticipantFlag,
        value: bool,
    ) -> Result<()> {
        if !self
            .store
            .set_participant_flag(&room.id, target, flag, value)?
        {
            return Err(Error::NotFound("participant"));
        }
        tracing::info!(room_id = %room.id, user_id = %target, ?flag, value, "participant updated");
        self.sync_media(room, target).await
    }

    pub async fn set_muted(
        &self,
        actor: &Principal,
        room_id: &str,
        target: &str,
        muted: bool,
    ) -> Result<()> {
        let room = self.room(room_id)?;
        self.require(&room, actor, |p| p.can_mute_audio, "mute participants")?;
        self.set_flag(&room, target, ParticipantFlag::Muted, muted)
            .await
    }

    pub async fn set_video_off(
        &self,
        actor: &Principal,
        room_id: &str,
        target: &str,
        off: bool,
    ) -> Result<()> {
        let room = self.room(room_id)?;
        self.require(&room, actor, |p| p.can_disable_video, "disable video")?;
        self.set_flag(&room, target, ParticipantFlag::VideoOff, off)
            .await
    }

    pub async fn set_chat_blocked(
        &self,
        actor: &Principal,
        room_id: &str,
        target: &str,
        blocked: bool,
    ) -> Result<()> {
        let room = self.room(room_id)?;
        self.require(&room, actor, |p| p.is_admin, "block chat")?;
        self.set_flag(&room, target, ParticipantFlag::ChatBlocked, blocked)
            .await
    }

    /// Moves `target` on or off stage. Re-applying the current state succeeds.
    pub async fn set_on_stage(
        &self,
        actor: &Principal,
        room_id: &str,
        target: &str,
        on_stage: bool,
    ) -> Result<()> {
        let room = self.room(room_id)?;
        self.require(&room, actor, |p| p.is_admin, "manage the stage")?;

        let participant = self.participant(room_id, target)?;
        if on_stage && room.settings.require_approval && !participant.is_approved {
            return Err(Error::Validation(
                "participant must be approved before joining the stage".into(),
            ));
        }
        self.set_flag(&room, target, ParticipantFlag::OnStage, on_stage)
            .await
    }

    pub async fn approve_participant(
        &self,
        actor: &Principal,
        room_id: &str,
        target: &str,
    ) -> Result<()> {
        let room = self.room(room_id)?;
        self.require(&room, actor, |p| p.is_admin, "approve participants")?;
        self.set_flag(&room, target, ParticipantFlag::Approved, true)
            .await
    }

    pub async fn update_permissions(
        &self,
        actor: &Principal,
        room_id: &str,
        target: &str,
        update: PermissionUpdate,
    ) -> Result<RoomPermissions> {
        let room = self.room(room_id)?;
        self.require(&room, actor, |p| p.is_admin, "change permissions")?;
        if target == room.created_by && actor.user_id != room.created_by {
            return Err(Error::Forbidden(
                "only the creator can change their own permissions".into(),
            ));
        }
        self.participant(room_id, target)?;

        let permissions = RoomPermissions {
            room_id: room.id.clone(),
            user_id: target.to_string(),
            is_admin: update.is_admin,
            can_kick: update.can_kick,
            can_mute_audio: update.can_mute_audio,
            can_disable_video: update.can_disable_video,
            can_chat: update.can_chat,
        };
        self.store.upsert_permissions(&permissions)?;
        tracing::info!(
            room_id = %room.id,
            user_id = %target,
            by = %actor.user_id,
            "permissions updated"
        );

        self.sync_media(&room, target).await?;
        Ok(permissions)
    }

    pub fn update_settings(
        &self,
        actor: &Principal,
        room_id: &str,
        mut settings: RoomSettings,
    ) -> Result<Room> {
        let room = self.room(room_id)?;
        self.require(&room, actor, |p| p.is_admin, "change settings")?;
        if room.mode == RoomMode::Clubhouse {
            settings.allow_video = false;
        }
        self.store.update_room_settings(&room.id, &settings)?;
        self.room(room_id)
    }

    /// Deletes the room and everything it owns. Only the creator may do this.
    pub async fn delete_room(&self, actor: &Principal, room_id: &str) -> Result<()> {
        let room = self.room(room_id)?;
        if actor.user_id != room.created_by {
            tracing::debug!(
                room_id = %room_id,
                user_id = %actor.user_id,
                "non-creator delete refused"
            );
            return Err(Error::Forbidden(
                "only the room creator can delete the room".into(),
            ));
        }

        self.store.delete_room(&room.id)?;
        tracing::info!(room_id = %room.id, room = %room.name, "room deleted");

        if let Err(e) = self.media.delete_room(&room.name).await {
            tracing::warn!(room = %room.name, error = %e, "failed to delete media room");
        }
        Ok(())
    }

    pub fn list_user_rooms(&self, actor: &Principal) -> Result<UserRooms> {
        Ok(UserRooms {
            created: self.store.list_rooms_created_by(&actor.user_id)?,
            participated: self.store.list_rooms_participated_by(&actor.user_id)?,
        })
    }

    pub fn list_all_rooms(&self) -> Result<Vec<Room>> {
        self.store.list_rooms()
    }

    pub fn participants(
        &self,
        actor: &Principal,
        room_id: &str,
    ) -> Result<Vec<ParticipantProfile>> {
        let room = self.room(room_id)?;
        let is_member = self
            .store
            .get_participant(&room.id, &actor.user_id)?
            .is_some_and(|p| p.is_active);
        if !is_member && !actor.has_role(Role::Admin) {
            return Err(Error::Forbidden("not a participant of this room".into()));
        }
        self.store.list_active_participants(&room.id)
    }

    /// Mints a room-admin grant for a global administrator.
    pub fn admin_grant(&self, actor: &Principal, room_id: &str) -> Result<AdminGrant> {
        if !actor.has_role(Role::Admin) {
            return Err(Error::Forbidden("admin role required".into()));
        }
        let room = self.room(room_id)?;
        let grant = MediaGrant {
            identity: actor.user_id.clone(),
            name: actor.name.clone(),
            room: room.name.clone(),
            room_admin: true,
            permission: MediaPermission {
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                can_publish_sources: vec![
                    TrackSource::Microphone,
                    TrackSource::Camera,
                    TrackSource::ScreenShare,
                ],
            },
        };
        let token = self.media.mint_grant(&grant, self.grant_ttl)?;

        tracing::info!(room_id = %room.id, user_id = %actor.user_id, "admin grant issued");
        Ok(AdminGrant {
            room,
            token,
            media_url: self.media_url.clone(),
        })
    }

    /// Deactivates rooms past their expiry. Memberships are left untouched.
    pub fn cleanup_expired_rooms(&self) -> Result<usize> {
        let count = self.store.deactivate_expired_rooms(Utc::now())?;
        if count > 0 {
            tracing::info!(count, "deactivated expired rooms");
        }
        Ok(count)
    }
}
