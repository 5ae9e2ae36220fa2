use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::COOKIE, header::SET_COOKIE},
    response::IntoResponse,
    routing::{delete, get, post},
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::{AssertionResponse, AttestationResponse, FederatedIdentity, RequireUser};
use crate::error::{Error, PasskeyError};
use crate::server::AppState;
use crate::server::dto::{
    FederatedCallbackRequest, GuestLoginRequest, LoginRequest, MeResponse, PasskeySignupRequest,
    RefreshRequest, RegisterRequest, StatusResponse,
};
use crate::server::response::{ApiError, ApiResponse};

pub const SESSION_COOKIE: &str = "stagehand_sid";
pub const FEDERATION_SECRET_HEADER: &str = "x-federation-secret";

pub fn auth_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/guest-login", post(guest_login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/federated/callback", post(federated_callback))
        // Passkey ceremonies
        .route("/passkey/register/begin", post(passkey_register_begin))
        .route("/passkey/register/finish", post(passkey_register_finish))
        .route("/passkey/login/begin", post(passkey_login_begin))
        .route("/passkey/login/finish", post(passkey_login_finish))
        .route("/passkey/signup/begin", post(passkey_signup_begin))
        .route("/passkey/signup/finish", post(passkey_signup_finish))
        .route("/passkeys", get(list_passkeys))
        .route("/passkeys/{id}", delete(delete_passkey))
}

/// Runs password hashing and other CPU-heavy auth work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("auth task failed: {e}")))?
        .map_err(ApiError::from)
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Returns the caller's ceremony session id, minting a cookie when absent.
fn ensure_session(state: &AppState, headers: &HeaderMap) -> Result<(String, HeaderMap), ApiError> {
    let mut out = HeaderMap::new();
    if let Some(id) = session_id(headers) {
        return Ok((id, out));
    }

    let id = Uuid::new_v4().to_string();
    let mut cookie = format!(
        "{SESSION_COOKIE}={id}; Path=/api/auth/passkey; HttpOnly; SameSite=Strict; Max-Age={}",
        state.config.auth.challenge_ttl_secs
    );
    if state.config.server.secure_cookies {
        cookie.push_str("; Secure");
    }
    let value = HeaderValue::from_str(&cookie)
        .map_err(|e| Error::Internal(format!("invalid session cookie: {e}")))?;
    out.insert(SET_COOKIE, value);
    Ok((id, out))
}

fn require_session(headers: &HeaderMap) -> Result<String, ApiError> {
    session_id(headers).ok_or_else(|| Error::from(PasskeyError::ChallengeExpiredOrMissing).into())
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let auth = state.auth.clone();
    let session = blocking(move || auth.register(&req.email, &req.password, &req.name)).await?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(session))))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let auth = state.auth.clone();
    let session = blocking(move || auth.login(&req.email, &req.password)).await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(session)))
}

pub async fn guest_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GuestLoginRequest>,
) -> impl IntoResponse {
    let session = state.auth.guest_login(&req.name)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(session))))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> impl IntoResponse {
    let tokens = state.auth.refresh(&req.refresh_token)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(tokens)))
}

pub async fn logout(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> impl IntoResponse {
    state.auth.logout(&auth.principal, &req.refresh_token)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StatusResponse::ok())))
}

pub async fn me(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let passkeys = state.auth.list_passkeys(&auth.user.id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(MeResponse {
        user: auth.user,
        passkeys,
    })))
}

/// Compares SHA-256 digests in constant time, so neither content nor length
/// of the expected secret shows in timing.
fn secret_matches(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub async fn federated_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<FederatedCallbackRequest>,
) -> impl IntoResponse {
    let Some(expected) = state.config.auth.federation_secret.as_deref() else {
        return Err(ApiError::forbidden("Federated login is disabled"));
    };
    let presented = headers
        .get(FEDERATION_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if !presented.is_some_and(|p| secret_matches(p, expected)) {
        tracing::warn!(security = true, "federated callback with bad secret");
        return Err(ApiError::forbidden("Invalid federation secret"));
    }

    let identity = FederatedIdentity {
        provider: req.provider,
        email: req.email,
        name: req.name,
        avatar_url: req.avatar_url,
    };
    let session = state.auth.federated_login(&identity)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(session)))
}

pub async fn passkey_register_begin(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (sid, cookie) = ensure_session(&state, &headers)?;
    let options = state.auth.begin_passkey_register(&sid, &auth.user.id)?;

    Ok::<_, ApiError>((cookie, Json(ApiResponse::success(options))))
}

pub async fn passkey_register_finish(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AttestationResponse>,
) -> impl IntoResponse {
    let sid = require_session(&headers)?;
    let credential = state
        .auth
        .finish_passkey_register(&sid, &auth.user.id, &req)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(credential))))
}

pub async fn passkey_login_begin(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (sid, cookie) = ensure_session(&state, &headers)?;
    let options = state.auth.begin_passkey_login(&sid);

    Ok::<_, ApiError>((cookie, Json(ApiResponse::success(options))))
}

pub async fn passkey_login_finish(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AssertionResponse>,
) -> impl IntoResponse {
    let sid = require_session(&headers)?;
    let session = state.auth.finish_passkey_login(&sid, &req)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(session)))
}

pub async fn passkey_signup_begin(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<PasskeySignupRequest>,
) -> impl IntoResponse {
    let (sid, cookie) = ensure_session(&state, &headers)?;
    let options = state
        .auth
        .begin_passkey_signup(&sid, &req.email, &req.name)?;

    Ok::<_, ApiError>((cookie, Json(ApiResponse::success(options))))
}

pub async fn passkey_signup_finish(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AttestationResponse>,
) -> impl IntoResponse {
    let sid = require_session(&headers)?;
    let session = state.auth.finish_passkey_signup(&sid, &req)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(session))))
}

pub async fn list_passkeys(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let passkeys = state.auth.list_passkeys(&auth.user.id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(passkeys)))
}

pub async fn delete_passkey(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.auth.delete_passkey(&auth.user.id, &id)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_matches() {
        assert!(secret_matches("shared-secret", "shared-secret"));
        assert!(!secret_matches("shared-secreT", "shared-secret"));
        assert!(!secret_matches("shared", "shared-secret"));
        assert!(!secret_matches("", "shared-secret"));
    }

    #[test]
    fn test_session_id_from_cookies() {
        let mut headers = HeaderMap::new();
        assert!(session_id(&headers).is_none());

        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; stagehand_sid=abc-123; other=1"),
        );
        assert_eq!(session_id(&headers).as_deref(), Some("abc-123"));

        headers.insert(COOKIE, HeaderValue::from_static("stagehand_sid="));
        assert!(session_id(&headers).is_none());
    }
}
