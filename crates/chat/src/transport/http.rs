// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for hub introspection.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::ChatError;
use crate::hub::Presence;
use crate::state::ChatState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub rooms: usize,
    pub clients: usize,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub request_id: String,
    pub members: Vec<Presence>,
}

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<ChatState>>) -> impl IntoResponse {
    let stats = s.hub.stats();
    let status = if s.hub.is_running() { "running" } else { "stopping" };
    Json(HealthResponse { status: status.to_owned(), rooms: stats.rooms, clients: stats.clients })
}

/// `GET /api/v1/rooms/{request_id}`: who is currently in a room.
pub async fn room_members(
    State(s): State<Arc<ChatState>>,
    Path(request_id): Path<String>,
) -> impl IntoResponse {
    match s.hub.members(&request_id) {
        Some(members) => Json(RoomResponse { request_id, members }).into_response(),
        None => ChatError::RoomNotFound
            .to_http_response(format!("no active chat for request {request_id}"))
            .into_response(),
    }
}
