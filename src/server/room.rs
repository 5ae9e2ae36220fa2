use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
};

use crate::auth::RequireUser;
use crate::rooms::{CreateRoom, PermissionUpdate};
use crate::server::AppState;
use crate::server::dto::{JoinRoomRequest, StatusResponse};
use crate::server::response::{ApiError, ApiResponse};
use crate::types::RoomSettings;

pub fn room_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create", post(create_room))
        .route("/join", post(join_room))
        .route("/list", get(list_rooms))
        .route("/{room_id}", delete(delete_room))
        .route("/{room_id}/leave", post(leave_room))
        .route("/{room_id}/participants", get(list_participants))
        .route("/{room_id}/settings", put(update_settings))
        // Moderation
        .route("/{room_id}/kick/{user_id}", post(kick))
        .route("/{room_id}/mute/{user_id}", post(mute))
        .route("/{room_id}/unmute/{user_id}", post(unmute))
        .route("/{room_id}/video/{user_id}/off", post(video_off))
        .route("/{room_id}/video/{user_id}/on", post(video_on))
        .route("/{room_id}/chat/{user_id}/block", post(block_chat))
        .route("/{room_id}/chat/{user_id}/unblock", post(unblock_chat))
        .route("/{room_id}/stage/{user_id}/bring", post(bring_to_stage))
        .route("/{room_id}/stage/{user_id}/remove", post(remove_from_stage))
        .route("/{room_id}/approve/{user_id}", post(approve))
        .route("/{room_id}/permissions/{user_id}", put(update_permissions))
}

pub async fn create_room(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRoom>,
) -> impl IntoResponse {
    let room = state.rooms.create_room(&auth.principal, req).await?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(room))))
}

pub async fn join_room(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<JoinRoomRequest>,
) -> impl IntoResponse {
    let joined = state.rooms.join_room(&auth.principal, &req.room_name)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(joined)))
}

pub async fn list_rooms(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rooms = state.rooms.list_user_rooms(&auth.principal)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(rooms)))
}

pub async fn leave_room(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    state.rooms.leave_room(&auth.principal, &room_id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StatusResponse::ok())))
}

pub async fn delete_room(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    state.rooms.delete_room(&auth.principal, &room_id).await?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_participants(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    let participants = state.rooms.participants(&auth.principal, &room_id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(participants)))
}

pub async fn update_settings(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(settings): Json<RoomSettings>,
) -> impl IntoResponse {
    let room = state
        .rooms
        .update_settings(&auth.principal, &room_id, settings)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(room)))
}

pub async fn kick(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state.rooms.kick(&auth.principal, &room_id, &user_id).await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StatusResponse::ok())))
}

pub async fn mute(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .rooms
        .set_muted(&auth.principal, &room_id, &user_id, true)
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StatusResponse::ok())))
}

pub async fn unmute(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .rooms
        .set_muted(&auth.principal, &room_id, &user_id, false)
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StatusResponse::ok())))
}

pub async fn video_off(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .rooms
        .set_video_off(&auth.principal, &room_id, &user_id, true)
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StatusResponse::ok())))
}

pub async fn video_on(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .rooms
        .set_video_off(&auth.principal, &room_id, &user_id, false)
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StatusResponse::ok())))
}

pub async fn block_chat(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .rooms
        .set_chat_blocked(&auth.principal, &room_id, &user_id, true)
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StatusResponse::ok())))
}

pub async fn unblock_chat(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .rooms
        .set_chat_blocked(&auth.principal, &room_id, &user_id, false)
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StatusResponse::ok())))
}

pub async fn bring_to_stage(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .rooms
        .set_on_stage(&auth.principal, &room_id, &user_id, true)
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StatusResponse::ok())))
}

pub async fn remove_from_stage(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .rooms
        .set_on_stage(&auth.principal, &room_id, &user_id, false)
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StatusResponse::ok())))
}

pub async fn approve(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .rooms
        .approve_participant(&auth.principal, &room_id, &user_id)
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(StatusResponse::ok())))
}

pub async fn update_permissions(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
    Json(update): Json<PermissionUpdate>,
) -> impl IntoResponse {
    let permissions = state
        .rooms
        .update_permissions(&auth.principal, &room_id, &user_id, update)
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(permissions)))
}
