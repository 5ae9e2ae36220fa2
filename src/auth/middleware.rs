use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{
        HeaderValue, StatusCode, header::AUTHORIZATION, header::WWW_AUTHENTICATE, request::Parts,
    },
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::server::AppState;
use crate::types::{Principal, Role, User};

/// Extractor that requires a valid access token belonging to an active user
pub struct RequireUser {
    pub principal: Principal,
    pub user: User,
}

/// Extractor that requires an access token carrying the admin role
pub struct RequireAdmin {
    pub principal: Principal,
    pub user: User,
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    AccountDisabled,
    NotAdmin,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Authentication required",
            ),
            AuthError::InvalidScheme => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid authorization scheme",
            ),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "unauthorized", "Invalid token"),
            AuthError::AccountDisabled => {
                (StatusCode::FORBIDDEN, "forbidden", "Account is deactivated")
            }
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "forbidden", "Admin access required"),
            AuthError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };

        let body = json!({ "data": null, "error": message, "code": code });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"stagehand\""),
            );
        }

        response
    }
}

/// Pulls the token out of `Authorization: Bearer <token>`.
fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuth)?
        .to_str()
        .map_err(|_| AuthError::InvalidScheme)?;

    let (scheme, token) = header.split_once(' ').ok_or(AuthError::InvalidScheme)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidScheme);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    Ok(token)
}

async fn authenticate(
    parts: &Parts,
    state: &Arc<AppState>,
) -> Result<(Principal, User), AuthError> {
    let token = bearer_token(parts)?;
    let principal = state
        .tokens
        .validate_access(token)
        .map_err(|_| AuthError::InvalidToken)?;

    let user = state
        .store
        .get_user(&principal.user_id)
        .map_err(|e| {
            tracing::error!(error = %e, "failed to load authenticated user");
            AuthError::InternalError
        })?
        .ok_or(AuthError::InvalidToken)?;

    if !user.is_active {
        return Err(AuthError::AccountDisabled);
    }

    Ok((principal, user))
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (principal, user) = authenticate(parts, state).await?;
        Ok(RequireUser { principal, user })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (principal, user) = authenticate(parts, state).await?;

        if !principal.has_role(Role::Admin) {
            tracing::warn!(security = true, user_id = %principal.user_id, "admin route denied");
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin { principal, user })
    }
}
