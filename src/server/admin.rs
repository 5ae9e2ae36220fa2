use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::{UserRolesRequest, UserStatusRequest};
use crate::server::response::{ApiError, ApiResponse};
use crate::types::Role;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", delete(delete_user))
        .route("/users/{id}/status", put(update_user_status))
        .route("/users/{id}/roles", put(update_user_roles))
        .route("/rooms", get(list_rooms))
        .route("/rooms/{room_id}/token", post(room_token))
}

pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let users = state.auth.list_users()?;

    Ok::<_, ApiError>(Json(ApiResponse::success(users)))
}

pub async fn update_user_status(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UserStatusRequest>,
) -> impl IntoResponse {
    if id == admin.user.id && !req.is_active {
        return Err(ApiError::bad_request("Cannot deactivate your own account"));
    }
    let user = state.auth.set_user_active(&id, req.is_active)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

pub async fn update_user_roles(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UserRolesRequest>,
) -> impl IntoResponse {
    let mut roles = Vec::with_capacity(req.roles.len());
    for raw in &req.roles {
        let role = Role::parse(raw)
            .ok_or_else(|| ApiError::bad_request(format!("Unknown role: {raw}")))?;
        roles.push(role);
    }

    // Only a superadmin may hand out roles at or above admin.
    let elevated = roles.iter().any(|r| r.satisfies(Role::Admin));
    if elevated && !admin.principal.has_role(Role::SuperAdmin) {
        return Err(ApiError::forbidden("Superadmin role required to grant admin roles"));
    }

    let user = state.auth.set_user_roles(&id, &roles)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

pub async fn delete_user(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if id == admin.user.id {
        return Err(ApiError::bad_request("Cannot delete your own account"));
    }
    state.auth.delete_user(&id)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_rooms(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rooms = state.rooms.list_all_rooms()?;

    Ok::<_, ApiError>(Json(ApiResponse::success(rooms)))
}

pub async fn room_token(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    let grant = state.rooms.admin_grant(&admin.principal, &room_id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(grant)))
}
