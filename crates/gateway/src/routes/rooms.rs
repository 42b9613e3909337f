use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use parlor_hub::{HubError, Message, Room, RoomId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{ApiError, AppState, CurrentUser};

pub const ROOM_NAME_MAX_LEN: usize = 64;
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub room_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    pub room_id: RoomId,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomResponse {
    pub room: Room,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomsResponse {
    pub rooms: Vec<Room>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

pub async fn list_rooms(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<RoomsResponse>, ApiError> {
    let stores = state.stores();
    let mut rooms = Vec::new();
    for room_id in stores.memberships.list_rooms_for_user(current.user.id).await? {
        rooms.push(stores.rooms.find_room(room_id).await?);
    }
    Ok(Json(RoomsResponse { rooms }))
}

/// Persist a room with its creator as first member, then bring it to life.
pub async fn create_room(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomResponse>), ApiError> {
    let name = request.room_name.trim();
    if name.is_empty() || name.chars().count() > ROOM_NAME_MAX_LEN {
        return Err(ApiError::bad_request(format!(
            "room name must be 1-{ROOM_NAME_MAX_LEN} characters"
        )));
    }

    let user_id = current.user.id;
    let room = state.stores().rooms.create_room(name).await?;
    state.stores().memberships.join_room(user_id, room.id).await?;

    state.hub().room_create(room.id).await?;
    state.hub().user_join_room(user_id, room.id).await?;

    info!(room_id = %room.id, %user_id, name = %room.name, "room created");
    Ok((StatusCode::CREATED, Json(RoomResponse { room })))
}

pub async fn join_room(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<RoomRequest>,
) -> Result<Json<RoomResponse>, ApiError> {
    let user_id = current.user.id;
    let room = state.stores().rooms.find_room(request.room_id).await?;
    state.stores().memberships.join_room(user_id, room.id).await?;
    state.hub().user_join_room(user_id, room.id).await?;

    Ok(Json(RoomResponse { room }))
}

pub async fn leave_room(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<RoomRequest>,
) -> Result<StatusCode, ApiError> {
    let user_id = current.user.id;
    let room = state.stores().rooms.find_room(request.room_id).await?;
    state.stores().memberships.leave_room(user_id, room.id).await?;
    state.hub().user_leave_room(user_id, room.id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_room(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(room_id): Path<RoomId>,
) -> Result<StatusCode, ApiError> {
    state.require_member(current.user.id, room_id).await?;
    state.stores().rooms.delete_room(room_id).await?;

    match state.hub().room_destroy(room_id).await {
        Ok(()) => {}
        Err(HubError::RoomNotFound(_)) => {
            warn!(%room_id, "deleted room had no live actor");
        }
        Err(error) => return Err(error.into()),
    }

    info!(%room_id, user_id = %current.user.id, "room deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_messages(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(room_id): Path<RoomId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    state.require_member(current.user.id, room_id).await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let messages = state.stores().messages.list_messages(room_id, limit).await?;

    Ok(Json(MessagesResponse { messages }))
}
