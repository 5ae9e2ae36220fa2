use std::time::{Duration, Instant};

use moka::sync::Cache;

/// Which passkey ceremony a pending challenge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CeremonyKind {
    Register,
    Login,
    Signup,
}

/// Server-side state of an issued, not yet consumed challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCeremony {
    pub challenge: String,
    /// Owner for registration, provisional id for signup.
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub issued_at: Instant,
}

impl PendingCeremony {
    #[must_use]
    pub fn new(challenge: String) -> Self {
        Self {
            challenge,
            user_id: None,
            email: None,
            name: None,
            issued_at: Instant::now(),
        }
    }
}

/// Ephemeral per-session holder for pending ceremonies.
/// `take` removes the entry, so every challenge is consumed at most once.
pub trait SessionStore: Send + Sync {
    fn put(&self, session_id: &str, kind: CeremonyKind, ceremony: PendingCeremony);
    fn take(&self, session_id: &str, kind: CeremonyKind) -> Option<PendingCeremony>;
}

pub struct MokaSessionStore {
    cache: Cache<(String, CeremonyKind), PendingCeremony>,
    ttl: Duration,
}

impl MokaSessionStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(ttl)
            .build();
        Self { cache, ttl }
    }
}

impl SessionStore for MokaSessionStore {
    fn put(&self, session_id: &str, kind: CeremonyKind, ceremony: PendingCeremony) {
        self.cache.insert((session_id.to_string(), kind), ceremony);
    }

    fn take(&self, session_id: &str, kind: CeremonyKind) -> Option<PendingCeremony> {
        self.cache
            .remove(&(session_id.to_string(), kind))
            .filter(|c| c.issued_at.elapsed() < self.ttl)
    }
}
