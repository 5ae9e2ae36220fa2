use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::MediaConfig;
use crate::error::{Error, Result};

const ADMIN_TOKEN_TTL: Duration = Duration::from_secs(600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Camera,
    Microphone,
    ScreenShare,
}

impl TrackSource {
    /// Name used inside join grants.
    #[must_use]
    pub fn grant_name(self) -> &'static str {
        match self {
            TrackSource::Camera => "camera",
            TrackSource::Microphone => "microphone",
            TrackSource::ScreenShare => "screen_share",
        }
    }

    /// Enum name used by the room service API.
    #[must_use]
    pub fn api_name(self) -> &'static str {
        match self {
            TrackSource::Camera => "CAMERA",
            TrackSource::Microphone => "MICROPHONE",
            TrackSource::ScreenShare => "SCREEN_SHARE",
        }
    }
}

/// What a participant may do inside the media room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPermission {
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub can_publish_data: bool,
    pub can_publish_sources: Vec<TrackSource>,
}

/// Parameters of a signed join capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaGrant {
    pub identity: String,
    pub name: String,
    pub room: String,
    pub room_admin: bool,
    pub permission: MediaPermission,
}

/// The external media server: an admin API plus signed capability minting.
#[async_trait::async_trait]
pub trait MediaService: Send + Sync {
    async fn create_room(&self, name: &str, max_participants: u32) -> Result<()>;
    async fn delete_room(&self, name: &str) -> Result<()>;
    async fn remove_participant(&self, room: &str, identity: &str) -> Result<()>;
    async fn update_participant(
        &self,
        room: &str,
        identity: &str,
        permission: &MediaPermission,
    ) -> Result<()>;
    fn mint_grant(&self, grant: &MediaGrant, ttl: Duration) -> Result<String>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoGrant<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    room: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    room_join: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    room_admin: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    room_create: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    can_publish: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    can_subscribe: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    can_publish_data: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    can_publish_sources: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    name: &'a str,
    nbf: i64,
    exp: i64,
    video: VideoGrant<'a>,
}

/// LiveKit-compatible media server reached over its Twirp room service.
pub struct LiveKitClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    encoding: EncodingKey,
}

impl LiveKitClient {
    pub fn new(config: &MediaConfig) -> Result<Self> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(Error::Config("media api key and secret are required".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build media client: {e}")))?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            encoding: EncodingKey::from_secret(config.api_secret.as_bytes()),
        })
    }

    fn sign(
        &self,
        identity: &str,
        name: &str,
        video: VideoGrant<'_>,
        ttl: Duration,
    ) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = GrantClaims {
            iss: &self.api_key,
            sub: identity,
            name,
            nbf: now,
            exp: now + ttl.as_secs() as i64,
            video,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("failed to sign media grant: {e}")))
    }

    fn admin_token(&self, room: Option<&str>) -> Result<String> {
        let video = VideoGrant {
            room,
            room_join: false,
            room_admin: room.is_some(),
            room_create: room.is_none(),
            can_publish: None,
            can_subscribe: None,
            can_publish_data: None,
            can_publish_sources: Vec::new(),
        };
        self.sign("stagehand", "", video, ADMIN_TOKEN_TTL)
    }

    async fn call(&self, method: &str, room: Option<&str>, body: Value) -> Result<()> {
        let url = format!("{}/twirp/livekit.RoomService/{method}", self.api_url);
        let token = self.admin_token(room)?;

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Media(format!("{method}: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::Media(format!("{method}: {status} {detail}")));
        }

        tracing::debug!(method, "media api call succeeded");
        Ok(())
    }
}

fn permission_body(permission: &MediaPermission) -> Value {
    json!({
        "can_subscribe": permission.can_subscribe,
        "can_publish": permission.can_publish,
        "can_publish_data": permission.can_publish_data,
        "can_publish_sources": permission
            .can_publish_sources
            .iter()
            .map(|s| s.api_name())
            .collect::<Vec<_>>(),
    })
}

#[async_trait::async_trait]
impl MediaService for LiveKitClient {
    async fn create_room(&self, name: &str, max_participants: u32) -> Result<()> {
        self.call(
            "CreateRoom",
            None,
            json!({ "name": name, "max_participants": max_participants }),
        )
        .await
    }

    async fn delete_room(&self, name: &str) -> Result<()> {
        self.call("DeleteRoom", Some(name), json!({ "room": name }))
            .await
    }

    async fn remove_participant(&self, room: &str, identity: &str) -> Result<()> {
        self.call(
            "RemoveParticipant",
            Some(room),
            json!({ "room": room, "identity": identity }),
        )
        .await
    }

    async fn update_participant(
        &self,
        room: &str,
        identity: &str,
        permission: &MediaPermission,
    ) -> Result<()> {
        self.call(
            "UpdateParticipant",
            Some(room),
            json!({
                "room": room,
                "identity": identity,
                "permission": permission_body(permission),
            }),
        )
        .await
    }

    fn mint_grant(&self, grant: &MediaGrant, ttl: Duration) -> Result<String> {
        let video = VideoGrant {
            room: Some(&grant.room),
            room_join: true,
            room_admin: grant.room_admin,
            room_create: false,
            can_publish: Some(grant.permission.can_publish),
            can_subscribe: Some(grant.permission.can_subscribe),
            can_publish_data: Some(grant.permission.can_publish_data),
            can_publish_sources: grant
                .permission
                .can_publish_sources
                .iter()
                .map(|s| s.grant_name())
                .collect(),
        };
        self.sign(&grant.identity, &grant.name, video, ttl)
    }
}
