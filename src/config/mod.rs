mod server;

pub use server::ServerConfig;

use std::path::Path;
use std::time::Duration;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MIN_SECRET_LEN: usize = 32;

pub const ENV_JWT_SECRET: &str = "STAGEHAND_JWT_SECRET";
pub const ENV_MEDIA_API_KEY: &str = "STAGEHAND_MEDIA_API_KEY";
pub const ENV_MEDIA_API_SECRET: &str = "STAGEHAND_MEDIA_API_SECRET";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub passkey: PasskeyConfig,
    pub media: MediaConfig,
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    /// Revoke the presented refresh token when it is rotated.
    pub revoke_on_rotate: bool,
    pub challenge_ttl_secs: u64,
    /// Shared secret expected in `X-Federation-Secret` on federated callbacks.
    /// Federated login is disabled when unset.
    pub federation_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_ttl_secs: 60 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            revoke_on_rotate: true,
            challenge_ttl_secs: 5 * 60,
            federation_secret: None,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_secs)
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs)
    }

    #[must_use]
    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasskeyConfig {
    /// Relying-party id, usually the bare host name of the frontend.
    pub rp_id: String,
    pub rp_name: String,
    /// Exact origin the browser reports in clientDataJSON.
    pub origin: String,
}

impl Default for PasskeyConfig {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "Stagehand".to_string(),
            origin: "http://localhost:8090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Admin API base URL of the media server.
    pub api_url: String,
    /// URL handed to clients alongside join grants.
    pub public_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub grant_ttl_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:7880".to_string(),
            public_url: "ws://127.0.0.1:7880".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            grant_ttl_secs: 60 * 60,
        }
    }
}

impl MediaConfig {
    #[must_use]
    pub fn grant_ttl(&self) -> Duration {
        Duration::from_secs(self.grant_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

impl SweeperConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Reads a TOML file, applies environment overrides and validates.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml(&raw)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// A default configuration with freshly generated secrets.
    #[must_use]
    pub fn generate() -> Self {
        let mut config = Self::default();
        config.auth.jwt_secret = random_secret();
        config.media.api_key = "stagehand".to_string();
        config.media.api_secret = random_secret();
        config
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(ENV_JWT_SECRET) {
            self.auth.jwt_secret = secret;
        }
        if let Some(key) = lookup(ENV_MEDIA_API_KEY) {
            self.media.api_key = key;
        }
        if let Some(secret) = lookup(ENV_MEDIA_API_SECRET) {
            self.media.api_secret = secret;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(Error::Config(format!(
                "auth.jwt_secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if self.auth.access_ttl_secs == 0 || self.auth.refresh_ttl_secs == 0 {
            return Err(Error::Config("token lifetimes must be positive".into()));
        }
        if self.auth.access_ttl_secs >= self.auth.refresh_ttl_secs {
            return Err(Error::Config(
                "auth.access_ttl_secs must be shorter than auth.refresh_ttl_secs".into(),
            ));
        }
        if self.auth.challenge_ttl_secs == 0 {
            return Err(Error::Config("auth.challenge_ttl_secs must be positive".into()));
        }
        if self.passkey.rp_id.trim().is_empty() {
            return Err(Error::Config("passkey.rp_id cannot be empty".into()));
        }
        if self.passkey.origin.trim().is_empty() {
            return Err(Error::Config("passkey.origin cannot be empty".into()));
        }
        if self.media.grant_ttl_secs == 0 {
            return Err(Error::Config("media.grant_ttl_secs must be positive".into()));
        }
        if self.sweeper.interval_secs == 0 {
            return Err(Error::Config("sweeper.interval_secs must be positive".into()));
        }
        Ok(())
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
