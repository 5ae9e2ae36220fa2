use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::token::{TokenPair, TokenService};
use super::webauthn::{
    ALG_EDDSA, ALG_ES256, AttestationObject, AttestedCredential, AuthenticatorData, ClientData,
    TYPE_CREATE, TYPE_GET, decode_b64, encode_b64, verify_assertion,
};
use crate::config::PasskeyConfig;
use crate::error::{Error, PasskeyError, Result};
use crate::store::Store;
use crate::types::{PasskeyCredential, Role, User};

const CHALLENGE_BYTES: usize = 32;
const PUBLIC_KEY: &str = "public-key";
const DEFAULT_PASSKEY_NAME: &str = "Passkey";

#[derive(Debug, Clone, Serialize)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialParameter {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub alg: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub resident_key: &'static str,
    pub user_verification: &'static str,
}

/// `PublicKeyCredentialCreationOptions` as sent to the browser.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub challenge: String,
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<CredentialParameter>,
    pub timeout: u64,
    pub attestation: &'static str,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelection,
}

/// `PublicKeyCredentialRequestOptions` as sent to the browser.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub challenge: String,
    pub rp_id: String,
    pub timeout: u64,
    pub user_verification: &'static str,
    pub allow_credentials: Vec<CredentialDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttestationResponse {
    #[serde(rename = "credentialId", default)]
    pub credential_id: Option<String>,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssertionResponse {
    #[serde(rename = "credentialId")]
    pub credential_id: String,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
}

/// Identity captured when a passkey signup begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupIdentity {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

/// Drives passkey registration, login and signup. Challenges are handed back
/// to the caller, which keeps them in a session holder until the matching
/// finish call.
pub struct ChallengeCeremony {
    store: Arc<dyn Store>,
    tokens: Arc<TokenService>,
    rp_id: String,
    rp_name: String,
    origin: String,
    timeout: Duration,
}

#[must_use]
pub fn new_challenge() -> String {
    let mut bytes = [0u8; CHALLENGE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    encode_b64(&bytes)
}

fn pub_key_cred_params() -> Vec<CredentialParameter> {
    vec![
        CredentialParameter {
            kind: PUBLIC_KEY,
            alg: ALG_ES256,
        },
        CredentialParameter {
            kind: PUBLIC_KEY,
            alg: ALG_EDDSA,
        },
    ]
}

impl ChallengeCeremony {
    pub fn new(
        store: Arc<dyn Store>,
        tokens: Arc<TokenService>,
        config: &PasskeyConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            tokens,
            rp_id: config.rp_id.clone(),
            rp_name: config.rp_name.clone(),
            origin: config.origin.clone(),
            timeout,
        }
    }

    fn creation_options(
        &self,
        challenge: String,
        user_id: &str,
        email: &str,
        name: &str,
        exclude: &[PasskeyCredential],
    ) -> CreationOptions {
        CreationOptions {
            challenge,
            rp: RelyingParty {
                id: self.rp_id.clone(),
                name: self.rp_name.clone(),
            },
            user: UserEntity {
                id: encode_b64(user_id.as_bytes()),
                name: email.to_string(),
                display_name: name.to_string(),
            },
            pub_key_cred_params: pub_key_cred_params(),
            timeout: self.timeout.as_millis() as u64,
            attestation: "none",
            exclude_credentials: exclude
                .iter()
                .map(|p| CredentialDescriptor {
                    kind: PUBLIC_KEY,
                    id: encode_b64(&p.credential_id),
                })
                .collect(),
            authenticator_selection: AuthenticatorSelection {
                resident_key: "preferred",
                user_verification: "preferred",
            },
        }
    }

    /// Verifies a creation response and returns the attested credential with
    /// the authenticator's initial counter.
    fn verify_attestation(
        &self,
        challenge: &str,
        response: &AttestationResponse,
    ) -> std::result::Result<(AttestedCredential, u32), PasskeyError> {
        let client_data_raw = decode_b64(&response.client_data_json)?;
        ClientData::parse(&client_data_raw)?.verify(TYPE_CREATE, challenge, &self.origin)?;

        let object = AttestationObject::parse(&decode_b64(&response.attestation_object)?)?;
        let auth_data = AuthenticatorData::parse(&object.auth_data)?;
        auth_data.verify_rp(&self.rp_id)?;

        let attested = auth_data.attested.ok_or(PasskeyError::Malformed)?;
        if let Some(id) = &response.credential_id {
            if decode_b64(id)? != attested.credential_id {
                return Err(PasskeyError::Malformed);
            }
        }

        Ok((attested, auth_data.sign_count))
    }

    fn build_credential(
        user_id: &str,
        attested: AttestedCredential,
        counter: u32,
        name: Option<&str>,
    ) -> PasskeyCredential {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_PASSKEY_NAME);

        PasskeyCredential {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            algorithm: attested.public_key.algorithm(),
            public_key: attested.public_key.to_stored_bytes(),
            credential_id: attested.credential_id,
            counter,
            name: name.to_string(),
            clone_suspected: false,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    // Registration for an existing user

    pub fn begin_register(&self, user_id: &str) -> Result<CreationOptions> {
        let user = self.store.get_user(user_id)?.ok_or(Error::NotFound("user"))?;
        let existing = self.store.list_user_passkeys(&user.id)?;

        Ok(self.creation_options(new_challenge(), &user.id, &user.email, &user.name, &existing))
    }

    pub fn finish_register(
        &self,
        user_id: &str,
        challenge: &str,
        response: &AttestationResponse,
    ) -> Result<PasskeyCredential> {
        let (attested, counter) = self.verify_attestation(challenge, response).map_err(|e| {
            tracing::debug!(user_id = %user_id, reason = %e, "passkey registration rejected");
            e
        })?;

        let credential =
            Self::build_credential(user_id, attested, counter, response.name.as_deref());
        self.store.create_passkey(&credential)?;

        tracing::info!(user_id = %user_id, passkey_id = %credential.id, "passkey registered");
        Ok(credential)
    }

    // Login

    #[must_use]
    pub fn begin_login(&self) -> RequestOptions {
        RequestOptions {
            challenge: new_challenge(),
            rp_id: self.rp_id.clone(),
            timeout: self.timeout.as_millis() as u64,
            user_verification: "preferred",
            allow_credentials: Vec::new(),
        }
    }

    pub fn finish_login(
        &self,
        challenge: &str,
        response: &AssertionResponse,
    ) -> Result<(User, TokenPair)> {
        let credential_id = decode_b64(&response.credential_id)?;
        let credential = self
            .store
            .get_passkey_by_credential_id(&credential_id)?
            .ok_or(PasskeyError::CredentialNotFound)?;

        if credential.clone_suspected {
            tracing::warn!(
                security = true,
                passkey_id = %credential.id,
                "flagged passkey presented"
            );
            return Err(PasskeyError::ReplayDetected.into());
        }

        let client_data_raw = decode_b64(&response.client_data_json)?;
        let auth_data_raw = decode_b64(&response.authenticator_data)?;
        let signature = decode_b64(&response.signature)?;

        ClientData::parse(&client_data_raw)?.verify(TYPE_GET, challenge, &self.origin)?;
        let auth_data = AuthenticatorData::parse(&auth_data_raw)?;
        auth_data.verify_rp(&self.rp_id)?;

        verify_assertion(
            credential.algorithm,
            &credential.public_key,
            &auth_data_raw,
            &client_data_raw,
            &signature,
        )?;

        if !self
            .store
            .advance_passkey_counter(&credential.id, auth_data.sign_count, Utc::now())?
        {
            self.store.flag_passkey_clone(&credential.id)?;
            tracing::warn!(
                security = true,
                passkey_id = %credential.id,
                user_id = %credential.user_id,
                stored = credential.counter,
                presented = auth_data.sign_count,
                "passkey counter did not advance; credential flagged"
            );
            return Err(PasskeyError::ReplayDetected.into());
        }

        let user = self
            .store
            .get_user(&credential.user_id)?
            .ok_or(PasskeyError::CredentialNotFound)?;
        if !user.is_active {
            return Err(Error::AccountDisabled);
        }

        let tokens = self.tokens.issue_for(&user)?;
        tracing::info!(user_id = %user.id, "passkey login");
        Ok((user, tokens))
    }

    // Signup: new account whose only credential is a passkey

    pub fn begin_signup(
        &self,
        email: &str,
        name: &str,
    ) -> Result<(CreationOptions, SignupIdentity)> {
        let email = email.trim().to_ascii_lowercase();
        let name = name.trim();
        if !email.contains('@') || name.is_empty() {
            return Err(Error::Validation("email and name are required".into()));
        }
        if self.store.get_user_by_email(&email)?.is_some() {
            return Err(Error::EmailTaken);
        }

        let identity = SignupIdentity {
            user_id: Uuid::new_v4().to_string(),
            email,
            name: name.to_string(),
        };
        let options = self.creation_options(
            new_challenge(),
            &identity.user_id,
            &identity.email,
            &identity.name,
            &[],
        );
        Ok((options, identity))
    }

    pub fn finish_signup(
        &self,
        identity: &SignupIdentity,
        challenge: &str,
        response: &AttestationResponse,
    ) -> Result<(User, TokenPair)> {
        let (attested, counter) = self.verify_attestation(challenge, response).map_err(|e| {
            tracing::debug!(email = %identity.email, reason = %e, "passkey signup rejected");
            e
        })?;

        let now = Utc::now();
        let user = User {
            id: identity.user_id.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            password_hash: None,
            provider: "passkey".to_string(),
            roles: vec![Role::User],
            is_active: true,
            refresh_token: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        let credential =
            Self::build_credential(&user.id, attested, counter, response.name.as_deref());

        self.store.create_user_with_passkey(&user, &credential)?;
        let tokens = self.tokens.issue_for(&user)?;

        tracing::info!(user_id = %user.id, "passkey signup");
        Ok((user, tokens))
    }
}
