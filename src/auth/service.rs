use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::passkey::{
    AssertionResponse, AttestationResponse, ChallengeCeremony, CreationOptions, RequestOptions,
    SignupIdentity,
};
use super::password::{MIN_PASSWORD_LEN, PasswordManager};
use super::session::{CeremonyKind, MokaSessionStore, PendingCeremony, SessionStore};
use super::token::{TokenPair, TokenService};
use crate::config::Config;
use crate::error::{Error, PasskeyError, Result};
use crate::store::Store;
use crate::types::{PasskeyCredential, Principal, Role, User, normalize_roles};

const GUEST_PROVIDER: &str = "guest";
const GUEST_EMAIL_DOMAIN: &str = "guest.stagehand.local";
const MAX_NAME_LEN: usize = 100;

/// A signed-in user and their freshly issued tokens.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

/// An identity asserted by an external provider.
#[derive(Debug, Clone)]
pub struct FederatedIdentity {
    pub provider: String,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(Error::Validation("a valid email address is required".into())),
    }
}

fn normalize_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Composes password, guest, federated and passkey sign-in on top of the
/// token service and the challenge ceremony.
pub struct AuthService {
    store: Arc<dyn Store>,
    tokens: Arc<TokenService>,
    ceremony: ChallengeCeremony,
    sessions: Arc<dyn SessionStore>,
    passwords: PasswordManager,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        tokens: Arc<TokenService>,
        ceremony: ChallengeCeremony,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            store,
            tokens,
            ceremony,
            sessions,
            passwords: PasswordManager::new(),
        }
    }

    /// Builds the service and its token issuer from configuration.
    pub fn from_config(config: &Config, store: Arc<dyn Store>) -> Result<Self> {
        let tokens = Arc::new(TokenService::new(&config.auth, store.clone())?);
        let ceremony = ChallengeCeremony::new(
            store.clone(),
            tokens.clone(),
            &config.passkey,
            config.auth.challenge_ttl(),
        );
        let sessions = Arc::new(MokaSessionStore::new(config.auth.challenge_ttl()));
        Ok(Self::new(store, tokens, ceremony, sessions))
    }

    #[must_use]
    pub fn token_service(&self) -> Arc<TokenService> {
        self.tokens.clone()
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    fn new_user(email: String, name: String, provider: &str, roles: Vec<Role>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4().to_string(),
            email,
            name,
            password_hash: None,
            provider: provider.to_string(),
            roles,
            is_active: true,
            refresh_token: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn session_for(&self, user: User) -> Result<Session> {
        let tokens = self.tokens.issue_for(&user)?;
        Ok(Session { user, tokens })
    }

    pub fn register(&self, email: &str, password: &str, name: &str) -> Result<Session> {
        let email = normalize_email(email)?;
        let name = normalize_name(name)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.store.get_user_by_email(&email)?.is_some() {
            return Err(Error::EmailTaken);
        }

        let mut user = Self::new_user(email, name, "local", vec![Role::User]);
        user.password_hash = Some(self.passwords.hash(password)?);
        self.store.create_user(&user)?;

        tracing::info!(user_id = %user.id, "user registered");
        self.session_for(user)
    }

    pub fn login(&self, email: &str, password: &str) -> Result<Session> {
        let email = email.trim().to_ascii_lowercase();
        let Some(user) = self.store.get_user_by_email(&email)? else {
            tracing::debug!("login for unknown email");
            return Err(Error::Unauthorized);
        };
        let Some(hash) = user.password_hash.as_deref() else {
            return Err(Error::Unauthorized);
        };
        if !self.passwords.verify(password, hash)? {
            tracing::warn!(security = true, user_id = %user.id, "failed password login");
            return Err(Error::Unauthorized);
        }
        if !user.is_active {
            return Err(Error::AccountDisabled);
        }

        tracing::info!(user_id = %user.id, "password login");
        self.session_for(user)
    }

    /// Creates a throwaway guest account and signs it in.
    pub fn guest_login(&self, name: &str) -> Result<Session> {
        let name = normalize_name(name)?;
        let email = format!("guest-{}@{GUEST_EMAIL_DOMAIN}", Uuid::new_v4());
        let user = Self::new_user(email, name, GUEST_PROVIDER, vec![Role::Guest]);
        self.store.create_user(&user)?;

        tracing::info!(user_id = %user.id, "guest login");
        self.session_for(user)
    }

    /// Signs in an externally authenticated identity, creating the account on
    /// first sight and refreshing profile fields afterwards.
    pub fn federated_login(&self, identity: &FederatedIdentity) -> Result<Session> {
        let email = normalize_email(&identity.email)?;
        let name = normalize_name(&identity.name)?;
        let provider = identity.provider.trim();
        if provider.is_empty() {
            return Err(Error::Validation("provider is required".into()));
        }

        let user = match self.store.get_user_by_email(&email)? {
            Some(mut user) => {
                if !user.is_active {
                    return Err(Error::AccountDisabled);
                }
                user.name = name;
                if identity.avatar_url.is_some() {
                    user.avatar_url.clone_from(&identity.avatar_url);
                }
                user.updated_at = Utc::now();
                self.store.update_user(&user)?;
                user
            }
            None => {
                let mut user = Self::new_user(email, name, provider, vec![Role::User]);
                user.avatar_url.clone_from(&identity.avatar_url);
                self.store.create_user(&user)?;
                tracing::info!(user_id = %user.id, provider = %provider, "federated user created");
                user
            }
        };

        self.session_for(user)
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        self.tokens.rotate(refresh_token)
    }

    pub fn logout(&self, principal: &Principal, refresh_token: &str) -> Result<()> {
        self.tokens.revoke(&principal.user_id, refresh_token)?;
        tracing::info!(user_id = %principal.user_id, "logged out");
        Ok(())
    }

    pub fn me(&self, user_id: &str) -> Result<User> {
        self.store.get_user(user_id)?.ok_or(Error::NotFound("user"))
    }

    // Passkey flows keyed by a client session id

    fn take_pending(&self, session_id: &str, kind: CeremonyKind) -> Result<PendingCeremony> {
        self.sessions
            .take(session_id, kind)
            .ok_or(Error::Passkey(PasskeyError::ChallengeExpiredOrMissing))
    }

    pub fn begin_passkey_register(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<CreationOptions> {
        let options = self.ceremony.begin_register(user_id)?;
        let mut pending = PendingCeremony::new(options.challenge.clone());
        pending.user_id = Some(user_id.to_string());
        self.sessions.put(session_id, CeremonyKind::Register, pending);
        Ok(options)
    }

    pub fn finish_passkey_register(
        &self,
        session_id: &str,
        user_id: &str,
        response: &AttestationResponse,
    ) -> Result<PasskeyCredential> {
        let pending = self.take_pending(session_id, CeremonyKind::Register)?;
        if pending.user_id.as_deref() != Some(user_id) {
            tracing::warn!(
                security = true,
                user_id = %user_id,
                "passkey registration for another user's challenge"
            );
            return Err(PasskeyError::ChallengeExpiredOrMissing.into());
        }
        self.ceremony
            .finish_register(user_id, &pending.challenge, response)
    }

    pub fn begin_passkey_login(&self, session_id: &str) -> RequestOptions {
        let options = self.ceremony.begin_login();
        self.sessions.put(
            session_id,
            CeremonyKind::Login,
            PendingCeremony::new(options.challenge.clone()),
        );
        options
    }

    pub fn finish_passkey_login(
        &self,
        session_id: &str,
        response: &AssertionResponse,
    ) -> Result<Session> {
        let pending = self.take_pending(session_id, CeremonyKind::Login)?;
        let (user, tokens) = self.ceremony.finish_login(&pending.challenge, response)?;
        Ok(Session { user, tokens })
    }

    pub fn begin_passkey_signup(
        &self,
        session_id: &str,
        email: &str,
        name: &str,
    ) -> Result<CreationOptions> {
        let name = normalize_name(name)?;
        let (options, identity) = self.ceremony.begin_signup(email, &name)?;
        let mut pending = PendingCeremony::new(options.challenge.clone());
        pending.user_id = Some(identity.user_id);
        pending.email = Some(identity.email);
        pending.name = Some(identity.name);
        self.sessions.put(session_id, CeremonyKind::Signup, pending);
        Ok(options)
    }

    pub fn finish_passkey_signup(
        &self,
        session_id: &str,
        response: &AttestationResponse,
    ) -> Result<Session> {
        let pending = self.take_pending(session_id, CeremonyKind::Signup)?;
        let (Some(user_id), Some(email), Some(name)) =
            (pending.user_id, pending.email, pending.name)
        else {
            return Err(PasskeyError::ChallengeExpiredOrMissing.into());
        };
        let identity = SignupIdentity {
            user_id,
            email,
            name,
        };
        let (user, tokens) = self
            .ceremony
            .finish_signup(&identity, &pending.challenge, response)?;
        Ok(Session { user, tokens })
    }

    pub fn list_passkeys(&self, user_id: &str) -> Result<Vec<PasskeyCredential>> {
        self.store.list_user_passkeys(user_id)
    }

    pub fn delete_passkey(&self, user_id: &str, passkey_id: &str) -> Result<()> {
        if !self.store.delete_passkey(user_id, passkey_id)? {
            return Err(Error::NotFound("passkey"));
        }
        Ok(())
    }

    // User administration

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.store.list_users()
    }

    pub fn set_user_active(&self, user_id: &str, active: bool) -> Result<User> {
        let mut user = self.me(user_id)?;
        user.is_active = active;
        user.updated_at = Utc::now();
        self.store.update_user(&user)?;
        tracing::info!(user_id = %user_id, active, "user status changed");
        Ok(user)
    }

    /// Replaces the user's roles. Takes effect on their next issued token.
    pub fn set_user_roles(&self, user_id: &str, roles: &[Role]) -> Result<User> {
        let roles = normalize_roles(roles.to_vec());
        if roles.is_empty() {
            return Err(Error::Validation("at least one role is required".into()));
        }
        let mut user = self.me(user_id)?;
        user.roles = roles;
        user.updated_at = Utc::now();
        self.store.update_user(&user)?;
        tracing::info!(user_id = %user_id, roles = ?user.roles, "user roles changed");
        Ok(user)
    }

    pub fn grant_role(&self, email: &str, role: Role) -> Result<User> {
        let email = email.trim().to_ascii_lowercase();
        let user = self
            .store
            .get_user_by_email(&email)?
            .ok_or(Error::NotFound("user"))?;
        let mut roles = user.roles.clone();
        roles.push(role);
        self.set_user_roles(&user.id, &roles)
    }

    pub fn delete_user(&self, user_id: &str) -> Result<()> {
        if !self.store.delete_user(user_id)? {
            return Err(Error::NotFound("user"));
        }
        tracing::info!(user_id = %user_id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::webauthn::encode_b64;
    use super::super::webauthn::fixtures::SoftAuthenticator;
    use super::*;
    use crate::config::{AuthConfig, PasskeyConfig};
    use crate::store::SqliteStore;

    fn service() -> AuthService {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let tokens = Arc::new(
            TokenService::new(
                &AuthConfig {
                    jwt_secret: "service-tests-secret-service-tests".into(),
                    ..AuthConfig::default()
                },
                store.clone(),
            )
            .unwrap(),
        );
        let ceremony = ChallengeCeremony::new(
            store.clone(),
            tokens.clone(),
            &PasskeyConfig::default(),
            Duration::from_secs(300),
        );
        let sessions = Arc::new(MokaSessionStore::new(Duration::from_secs(300)));
        AuthService::new(store, tokens, ceremony, sessions)
    }

    #[test]
    fn test_register_and_login() {
        let auth = service();
        let session = auth
            .register("Ada@Example.com", "correct horse", "Ada")
            .unwrap();
        assert_eq!(session.user.email, "ada@example.com");
        assert_eq!(session.user.roles, vec![Role::User]);

        let principal = auth.tokens().validate_access(&session.tokens.access_token).unwrap();
        assert_eq!(principal.user_id, session.user.id);

        let again = auth.login("ada@example.com", "correct horse").unwrap();
        assert_eq!(again.user.id, session.user.id);
    }

    #[test]
    fn test_register_validation() {
        let auth = service();
        assert!(matches!(
            auth.register("not-an-email", "long enough", "Ada"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            auth.register("ada@example.com", "short", "Ada"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            auth.register("ada@example.com", "long enough", "   "),
            Err(Error::Validation(_))
        ));

        auth.register("ada@example.com", "long enough", "Ada").unwrap();
        assert!(matches!(
            auth.register("ADA@example.com", "long enough", "Ada"),
            Err(Error::EmailTaken)
        ));
    }

    #[test]
    fn test_login_failures_are_indistinguishable() {
        let auth = service();
        auth.register("ada@example.com", "correct horse", "Ada").unwrap();

        assert!(matches!(
            auth.login("ada@example.com", "wrong horse"),
            Err(Error::Unauthorized)
        ));
        assert!(matches!(
            auth.login("nobody@example.com", "correct horse"),
            Err(Error::Unauthorized)
        ));
    }

    #[test]
    fn test_disabled_account_cannot_login() {
        let auth = service();
        let session = auth.register("ada@example.com", "correct horse", "Ada").unwrap();
        auth.set_user_active(&session.user.id, false).unwrap();

        assert!(matches!(
            auth.login("ada@example.com", "correct horse"),
            Err(Error::AccountDisabled)
        ));
        assert!(matches!(
            auth.refresh(&session.tokens.refresh_token),
            Err(Error::Unauthorized)
        ));
    }

    #[test]
    fn test_guest_login() {
        let auth = service();
        let a = auth.guest_login("Visitor").unwrap();
        let b = auth.guest_login("Visitor").unwrap();
        assert_ne!(a.user.id, b.user.id);
        assert_eq!(a.user.provider, "guest");
        assert_eq!(a.user.roles, vec![Role::Guest]);
        assert!(a.user.email.starts_with("guest-"));
    }

    #[test]
    fn test_federated_login_creates_then_reuses() {
        let auth = service();
        let identity = FederatedIdentity {
            provider: "github".into(),
            email: "lin@example.com".into(),
            name: "Lin".into(),
            avatar_url: None,
        };
        let first = auth.federated_login(&identity).unwrap();
        assert_eq!(first.user.provider, "github");

        let renamed = FederatedIdentity {
            name: "Lin Q".into(),
            avatar_url: Some("https://img.example.com/lin.png".into()),
            ..identity
        };
        let second = auth.federated_login(&renamed).unwrap();
        assert_eq!(second.user.id, first.user.id);
        assert_eq!(second.user.name, "Lin Q");
        assert_eq!(auth.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_logout_revokes_refresh_token() {
        let auth = service();
        let session = auth.register("ada@example.com", "correct horse", "Ada").unwrap();
        let principal = Principal::from(&session.user);

        auth.logout(&principal, &session.tokens.refresh_token).unwrap();
        assert!(matches!(
            auth.refresh(&session.tokens.refresh_token),
            Err(Error::Unauthorized)
        ));
    }

    #[test]
    fn test_role_change_visible_after_refresh() {
        let auth = service();
        let session = auth.register("ada@example.com", "correct horse", "Ada").unwrap();
        auth.grant_role("ada@example.com", Role::Admin).unwrap();

        let old = auth.tokens().validate_access(&session.tokens.access_token).unwrap();
        assert!(!old.has_role(Role::Admin));

        let pair = auth.refresh(&session.tokens.refresh_token).unwrap();
        let new = auth.tokens().validate_access(&pair.access_token).unwrap();
        assert!(new.has_role(Role::Admin));
    }

    #[test]
    fn test_empty_roles_rejected() {
        let auth = service();
        let session = auth.register("ada@example.com", "correct horse", "Ada").unwrap();
        assert!(matches!(
            auth.set_user_roles(&session.user.id, &[]),
            Err(Error::Validation(_))
        ));
    }

    fn attestation(authenticator: &SoftAuthenticator, challenge: &str) -> AttestationResponse {
        let config = PasskeyConfig::default();
        let (client_data, object) = authenticator.attest(challenge, &config.rp_id, &config.origin);
        AttestationResponse {
            credential_id: None,
            client_data_json: encode_b64(&client_data),
            attestation_object: encode_b64(&object),
            name: None,
        }
    }

    #[test]
    fn test_passkey_signup_then_login() {
        let auth = service();
        let config = PasskeyConfig::default();
        let mut authenticator = SoftAuthenticator::new(21);

        let options = auth
            .begin_passkey_signup("sid-1", "pk@example.com", "Passkey User")
            .unwrap();
        let session = auth
            .finish_passkey_signup("sid-1", &attestation(&authenticator, &options.challenge))
            .unwrap();
        assert_eq!(session.user.email, "pk@example.com");
        assert_eq!(auth.list_passkeys(&session.user.id).unwrap().len(), 1);

        let options = auth.begin_passkey_login("sid-2");
        let (client_data, auth_data, signature) =
            authenticator.assert(&options.challenge, &config.rp_id, &config.origin);
        let response = AssertionResponse {
            credential_id: encode_b64(&authenticator.credential_id),
            client_data_json: encode_b64(&client_data),
            authenticator_data: encode_b64(&auth_data),
            signature: encode_b64(&signature),
        };
        let login = auth.finish_passkey_login("sid-2", &response).unwrap();
        assert_eq!(login.user.id, session.user.id);

        // The challenge was consumed by the first finish.
        assert!(matches!(
            auth.finish_passkey_login("sid-2", &response),
            Err(Error::Passkey(PasskeyError::ChallengeExpiredOrMissing))
        ));
    }

    #[test]
    fn test_passkey_finish_without_begin() {
        let auth = service();
        let authenticator = SoftAuthenticator::new(2);
        assert!(matches!(
            auth.finish_passkey_signup("nobody", &attestation(&authenticator, "AQID")),
            Err(Error::Passkey(PasskeyError::ChallengeExpiredOrMissing))
        ));
    }

    #[test]
    fn test_passkey_register_bound_to_user() {
        let auth = service();
        let alice = auth.register("alice@example.com", "correct horse", "Alice").unwrap();
        let bob = auth.register("bob@example.com", "correct horse", "Bob").unwrap();
        let authenticator = SoftAuthenticator::new(8);

        let options = auth.begin_passkey_register("sid", &alice.user.id).unwrap();
        let response = attestation(&authenticator, &options.challenge);
        assert!(matches!(
            auth.finish_passkey_register("sid", &bob.user.id, &response),
            Err(Error::Passkey(PasskeyError::ChallengeExpiredOrMissing))
        ));
        assert!(auth.list_passkeys(&bob.user.id).unwrap().is_empty());

        let options = auth.begin_passkey_register("sid", &alice.user.id).unwrap();
        let response = attestation(&authenticator, &options.challenge);
        let credential = auth
            .finish_passkey_register("sid", &alice.user.id, &response)
            .unwrap();
        auth.delete_passkey(&alice.user.id, &credential.id).unwrap();
        assert!(matches!(
            auth.delete_passkey(&alice.user.id, &credential.id),
            Err(Error::NotFound(_))
        ));
    }
}
