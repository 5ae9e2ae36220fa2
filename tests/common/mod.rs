#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use ciborium::Value as Cbor;
use p256::ecdsa::SigningKey;
use p256::ecdsa::signature::Signer;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use stagehand::auth::encode_b64;
use stagehand::config::Config;
use stagehand::error::Error;
use stagehand::rooms::{MediaGrant, MediaPermission, MediaService};
use stagehand::server::{AppState, create_router};
use stagehand::store::{SqliteStore, Store};

pub const PASSWORD: &str = "correct horse battery";

/// Media backend that records calls and can be switched to fail.
#[derive(Default)]
pub struct FakeMedia {
    pub calls: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl FakeMedia {
    fn record(&self, call: String) -> stagehand::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Media("media server unavailable".into()));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MediaService for FakeMedia {
    async fn create_room(&self, name: &str, max_participants: u32) -> stagehand::Result<()> {
        self.record(format!("create {name} {max_participants}"))
    }

    async fn delete_room(&self, name: &str) -> stagehand::Result<()> {
        self.record(format!("delete {name}"))
    }

    async fn remove_participant(&self, room: &str, identity: &str) -> stagehand::Result<()> {
        self.record(format!("remove {room} {identity}"))
    }

    async fn update_participant(
        &self,
        room: &str,
        identity: &str,
        permission: &MediaPermission,
    ) -> stagehand::Result<()> {
        self.record(format!(
            "update {room} {identity} publish={}",
            permission.can_publish
        ))
    }

    fn mint_grant(&self, grant: &MediaGrant, _ttl: Duration) -> stagehand::Result<String> {
        self.record(format!("grant {} {}", grant.room, grant.identity))?;
        Ok(format!("grant.{}.{}", grant.room, grant.identity))
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = "integration-test-secret-0123456789abcdef".to_string();
    config.auth.federation_secret = Some("federation-shared-secret".to_string());
    config.media.api_key = "test".to_string();
    config.media.api_secret = "test-secret".to_string();
    config
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    /// The value of a `Set-Cookie` header with the given name.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.to_string())
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub media: Arc<FakeMedia>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store: Arc<dyn Store> =
            Arc::new(SqliteStore::open_in_memory().expect("open in-memory store"));
        let media = Arc::new(FakeMedia::default());
        let state = Arc::new(AppState::new(config, store, media.clone()).expect("build state"));
        let router = create_router(state.clone());
        Self {
            state,
            router,
            media,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        self.request_with(method, uri, token, body, &[]).await
    }

    pub async fn request_with(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    /// Registers a password account and returns its access token.
    pub async fn register(&self, email: &str, name: &str) -> String {
        let resp = self
            .post(
                "/api/auth/register",
                None,
                json!({"email": email, "password": PASSWORD, "name": name}),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "register: {}", resp.body);
        resp.data()["tokens"]["access_token"]
            .as_str()
            .expect("access token")
            .to_string()
    }

    /// Creates a room as `token` and returns (room id, room name).
    pub async fn create_room(&self, token: &str, body: Value) -> (String, String) {
        let resp = self.post("/api/room/create", Some(token), body).await;
        assert_eq!(resp.status, StatusCode::CREATED, "create room: {}", resp.body);
        (
            resp.data()["id"].as_str().expect("room id").to_string(),
            resp.data()["name"].as_str().expect("room name").to_string(),
        )
    }

    pub async fn join(&self, token: &str, room_name: &str) -> TestResponse {
        self.post("/api/room/join", Some(token), json!({"room_name": room_name}))
            .await
    }
}

/// A software ES256 authenticator producing browser-shaped JSON payloads.
pub struct SoftAuthenticator {
    pub credential_id: Vec<u8>,
    pub counter: u32,
    key: SigningKey,
}

impl SoftAuthenticator {
    pub fn new(seed: u8) -> Self {
        Self {
            credential_id: vec![seed; 16],
            counter: 0,
            key: SigningKey::from_slice(&[seed.max(1); 32]).expect("signing key"),
        }
    }

    fn client_data(kind: &str, challenge: &str, origin: &str) -> Vec<u8> {
        json!({ "type": kind, "challenge": challenge, "origin": origin })
            .to_string()
            .into_bytes()
    }

    fn cose_key(&self) -> Cbor {
        let point = self.key.verifying_key().to_encoded_point(false);
        Cbor::Map(vec![
            (Cbor::Integer(1.into()), Cbor::Integer(2.into())),
            (Cbor::Integer(3.into()), Cbor::Integer((-7).into())),
            (Cbor::Integer((-1).into()), Cbor::Integer(1.into())),
            (
                Cbor::Integer((-2).into()),
                Cbor::Bytes(point.x().expect("x").to_vec()),
            ),
            (
                Cbor::Integer((-3).into()),
                Cbor::Bytes(point.y().expect("y").to_vec()),
            ),
        ])
    }

    fn auth_data(&self, rp_id: &str, flags: u8, attested: bool) -> Vec<u8> {
        let mut out = Sha256::digest(rp_id.as_bytes()).to_vec();
        out.push(flags);
        out.extend_from_slice(&self.counter.to_be_bytes());
        if attested {
            out.extend_from_slice(&[0u8; 16]);
            out.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
            out.extend_from_slice(&self.credential_id);
            ciborium::into_writer(&self.cose_key(), &mut out).expect("encode cose key");
        }
        out
    }

    /// A registration response for `challenge`.
    pub fn attestation(&self, challenge: &str, rp_id: &str, origin: &str) -> Value {
        let client_data = Self::client_data("webauthn.create", challenge, origin);
        let object = Cbor::Map(vec![
            (Cbor::Text("fmt".into()), Cbor::Text("none".into())),
            (Cbor::Text("attStmt".into()), Cbor::Map(vec![])),
            (
                Cbor::Text("authData".into()),
                Cbor::Bytes(self.auth_data(rp_id, 0x45, true)),
            ),
        ]);
        let mut encoded = Vec::new();
        ciborium::into_writer(&object, &mut encoded).expect("encode attestation");
        json!({
            "credentialId": encode_b64(&self.credential_id),
            "clientDataJSON": encode_b64(&client_data),
            "attestationObject": encode_b64(&encoded),
        })
    }

    /// A login response for `challenge` with the counter bumped.
    pub fn assertion(&mut self, challenge: &str, rp_id: &str, origin: &str) -> Value {
        self.counter += 1;
        let client_data = Self::client_data("webauthn.get", challenge, origin);
        let auth_data = self.auth_data(rp_id, 0x05, false);
        let mut message = auth_data.clone();
        message.extend_from_slice(&Sha256::digest(&client_data));
        let signature: p256::ecdsa::Signature = self.key.sign(&message);
        json!({
            "credentialId": encode_b64(&self.credential_id),
            "clientDataJSON": encode_b64(&client_data),
            "authenticatorData": encode_b64(&auth_data),
            "signature": encode_b64(signature.to_der().as_bytes()),
        })
    }
}
